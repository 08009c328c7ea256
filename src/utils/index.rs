/// Formats an amount in the smallest currency unit as a decimal coin value.
///
/// `precision` caps the number of fractional digits shown; trailing zeros
/// beyond the first two are dropped so "1.50000000" renders as "1.50".
pub fn format_coin_amount(amount: u64, decimals: u32, precision: u32) -> String {
	let unit = 10u64.pow(decimals);
	let whole = amount / unit;
	let fraction = amount % unit;

	let precision = precision.min(decimals) as usize;
	let mut fraction_str = format!("{:0width$}", fraction, width = decimals as usize);
	fraction_str.truncate(precision);

	while fraction_str.len() > 2 && fraction_str.ends_with('0') {
		fraction_str.pop();
	}

	if fraction_str.is_empty() {
		whole.to_string()
	} else {
		format!("{}.{}", whole, fraction_str)
	}
}

/// Formats a signed amount, prefixing negative values with a minus sign.
pub fn format_signed_coin_amount(amount: i64, decimals: u32, precision: u32) -> String {
	let formatted = format_coin_amount(amount.unsigned_abs(), decimals, precision);
	if amount < 0 {
		format!("-{}", formatted)
	} else {
		formatted
	}
}
