/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    cents((val * 100.0).round() as i64)
}

/// Format an integer cent amount the same way: 500000 -> $5,000.00
pub fn cents(amount_in_cents: i64) -> String {
    let sign = if amount_in_cents < 0 { "-" } else { "" };
    let abs = amount_in_cents.unsigned_abs();
    let dollars = (abs / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, c) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}.{:02}", abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.00), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(42.10), "$42.10");
    }

    #[test]
    fn test_cents_formatting() {
        assert_eq!(cents(5000), "$50.00");
        assert_eq!(cents(123456789), "$1,234,567.89");
        assert_eq!(cents(-5), "-$0.05");
    }
}
