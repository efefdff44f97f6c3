use tracing::debug;

use crate::clean::clean_value;
use crate::model::CharacteristicEntry;

const NETTO_MARKER: &str = "нетто";

/// Pending "max … нетто" entry waiting for its "min" partner.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pairing {
    NoPending,
    Pending { index: usize, key: String },
}

#[derive(Debug)]
struct Pass {
    entries: Vec<CharacteristicEntry>,
    pairing: Pairing,
    averaged_pairs: usize,
}

fn is_netto_bound(lowered_key: &str, bound: &str) -> bool {
    lowered_key.contains(bound) && lowered_key.contains(NETTO_MARKER)
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().replace(',', ".").parse::<f64>().ok()
}

/// Mean of two bounds rounded to one decimal place, written with a decimal comma.
///
/// Non-finite means print as `nan`/`inf`; magnitudes from 1e16 up switch to
/// exponent notation (`1e+16`), where f64 has no fractional digit left.
fn format_average(max: f64, min: f64) -> String {
    let average = (max + min) / 2.0;
    let text = if average.is_nan() {
        "nan".to_string()
    } else if average.is_infinite() {
        String::from(if average > 0.0 { "inf" } else { "-inf" })
    } else if average.abs() >= 1e16 {
        exponent_notation(average)
    } else {
        format!("{average:.1}")
    };
    text.replace('.', ",")
}

fn exponent_notation(value: f64) -> String {
    let shortest = format!("{value:e}");
    match shortest.split_once('e') {
        Some((mantissa, exponent)) => match exponent.strip_prefix('-') {
            Some(digits) => format!("{mantissa}e-{digits:0>2}"),
            None => format!("{mantissa}e+{exponent:0>2}"),
        },
        None => shortest,
    }
}

fn step(mut pass: Pass, entry: CharacteristicEntry) -> Pass {
    let mut value = clean_value(&entry.value);
    let lowered = entry.key.to_lowercase();

    if is_netto_bound(&lowered, "max") {
        pass.pairing = Pairing::Pending {
            index: pass.entries.len(),
            key: entry.key.clone(),
        };
    } else if let (true, Pairing::Pending { index, key }) =
        (is_netto_bound(&lowered, "min"), &pass.pairing)
    {
        let max_entry = &mut pass.entries[*index];
        if let (Some(max), Some(min)) = (parse_number(&max_entry.value), parse_number(&value)) {
            let average = format_average(max, min);
            debug!(max_key = %key, min_key = %entry.key, max, min, %average, "netto bounds averaged");
            max_entry.value.clone_from(&average);
            value = average;
            pass.averaged_pairs += 1;
        }
    } else {
        pass.pairing = Pairing::NoPending;
    }

    pass.entries.push(CharacteristicEntry {
        key: entry.key,
        value,
    });
    pass
}

pub(crate) fn normalize_with_count(entries: Vec<CharacteristicEntry>) -> (Vec<CharacteristicEntry>, usize) {
    let initial = Pass {
        entries: Vec::with_capacity(entries.len()),
        pairing: Pairing::NoPending,
        averaged_pairs: 0,
    };
    let pass = entries.into_iter().fold(initial, step);
    (pass.entries, pass.averaged_pairs)
}

/// Cleans every value and replaces each adjacent "max нетто" / "min нетто"
/// pair with the mean of both bounds.
///
/// Any entry matching neither pattern closes the pairing window. A "min"
/// entry keeps the window open, so a following "min" is averaged against the
/// already averaged "max" value.
#[must_use]
pub fn normalize_entries(entries: Vec<CharacteristicEntry>) -> Vec<CharacteristicEntry> {
    normalize_with_count(entries).0
}
