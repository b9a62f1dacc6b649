//! Number to text conversion the way the Lua 5.3 runtime prints numbers.

/// Significant digits used by `LUAI_NUMFFORMAT` (`"%.14g"`).
const FLOAT_DIGITS: usize = 14;

/// Format a float like C's `printf("%.14g")`.
pub fn format_g14(value: f64) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Rounding to the target precision can carry into the exponent, so take
    // the exponent from the rounded scientific form.
    let sci = format!("{:.*e}", FLOAT_DIGITS - 1, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if (-4..FLOAT_DIGITS as i32).contains(&exp) {
        let decimals = (FLOAT_DIGITS as i32 - 1 - exp) as usize;
        strip_zeros(&format!("{value:.decimals$}")).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_zeros(mantissa), exp.abs())
    }
}

/// Format a float the way `tostring` does: `%.14g`, plus `.0` when the
/// result would otherwise read as an integer.
pub fn format_float(value: f64) -> String {
    let mut s = format_g14(value);
    if s.bytes().all(|b| b == b'-' || b.is_ascii_digit()) {
        s.push_str(".0");
    }
    s
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
