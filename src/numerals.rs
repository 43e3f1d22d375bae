// 🔤 Numeral Formatter - amounts written out in words for receipts

const ONES: [&str; 20] = [
    "", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten", "Eleven",
    "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen", "Eighteen", "Nineteen",
];

const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

/// Scale names for each group of three digits. u64 tops out in the
/// quintillions, so the table covers every value the type can hold.
const SCALES: [&str; 7] = [
    "",
    "Thousand",
    "Million",
    "Billion",
    "Trillion",
    "Quadrillion",
    "Quintillion",
];

/// Words for a group in 1..=999
fn group_words(group: u64, out: &mut Vec<&'static str>) {
    let hundreds = (group / 100) as usize;
    let rest = (group % 100) as usize;

    if hundreds > 0 {
        out.push(ONES[hundreds]);
        out.push("Hundred");
    }

    if rest >= 20 {
        out.push(TENS[rest / 10]);
        if rest % 10 > 0 {
            out.push(ONES[rest % 10]);
        }
    } else if rest > 0 {
        out.push(ONES[rest]);
    }
}

/// Convert a non-negative integer amount to English words.
///
/// ```
/// use collection_ledger::number_to_words;
/// assert_eq!(number_to_words(1520), "One Thousand Five Hundred Twenty");
/// assert_eq!(number_to_words(0), "Zero");
/// ```
pub fn number_to_words(amount: u64) -> String {
    if amount == 0 {
        return "Zero".to_string();
    }

    let mut groups = Vec::new();
    let mut remaining = amount;
    while remaining > 0 {
        groups.push(remaining % 1000);
        remaining /= 1000;
    }

    let mut words = Vec::new();
    for (scale, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        group_words(*group, &mut words);
        if !SCALES[scale].is_empty() {
            words.push(SCALES[scale]);
        }
    }

    words.join(" ")
}

/// Words for a monetary amount, cents truncated.
/// Negative and non-finite amounts have no written form.
pub fn amount_in_words(amount: f64) -> Option<String> {
    if !amount.is_finite() || amount < 0.0 || amount >= u64::MAX as f64 {
        return None;
    }
    Some(number_to_words(amount.trunc() as u64))
}
