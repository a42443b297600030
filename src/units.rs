//! Display helpers for addresses and native-unit amounts
//!
//! Everything here is pure and total: formatting never fails, parsing
//! reports a `Config` error with the offending input.

use crate::error::{Result, WalletError};
use alloy_primitives::U256;

/// Display symbol of the native unit
pub const NATIVE_SYMBOL: &str = "ETH";

/// Decimals between the smallest unit (wei) and the display unit
pub const NATIVE_DECIMALS: usize = 18;

/// Marker rendered instead of misleading precision for dust balances
pub const DUST_MARKER: &str = "<0.0001";

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// 0.0001 ether in wei
const DUST_THRESHOLD_WEI: u128 = 100_000_000_000_000;

/// Check that a string looks like an account address
///
/// True iff the string is exactly 42 characters long and starts with `0x`.
/// Used both to gate agent operations and to enable/disable affordances.
pub fn is_valid_address(candidate: &str) -> bool {
    candidate.starts_with("0x") && candidate.chars().count() == 42
}

/// Shorten an address for display: first 6 + `…` + last 6 characters
///
/// Strings of 12 characters or fewer are returned unchanged.
pub fn shorten_address(addr: &str) -> String {
    let chars: Vec<char> = addr.chars().collect();
    if chars.len() <= 12 {
        return addr.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Parse a decimal ether amount (e.g. `"0.05"`) into wei
pub fn parse_ether(amount: &str) -> Result<U256> {
    let trimmed = amount.trim();
    let invalid = |reason: &str| {
        WalletError::Config(format!("Invalid ether amount '{}': {}", amount, reason))
    };

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("empty"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected decimal digits"));
    }
    if frac.len() > NATIVE_DECIMALS {
        return Err(invalid("too many decimal places"));
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = NATIVE_DECIMALS);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|e| invalid(&e.to_string()))
}

/// Full-precision ether rendering (`1` ether → `"1.0"`, 5e16 wei → `"0.05"`)
pub fn format_ether(wei: U256) -> String {
    let one = U256::from(WEI_PER_ETHER);
    let whole = wei / one;
    let remainder = wei % one;

    let mut frac = format!("{:0>width$}", remainder.to_string(), width = NATIVE_DECIMALS);
    while frac.len() > 1 && frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}", whole, frac)
}

/// Human-friendly balance: `"<0.0001"` for dust, otherwise 4 decimals and a unit suffix
pub fn format_ether_friendly(wei: U256) -> String {
    let step = U256::from(DUST_THRESHOLD_WEI);
    if wei < step {
        return DUST_MARKER.to_string();
    }

    let half_step = U256::from(DUST_THRESHOLD_WEI / 2);
    let ten_thousandths = wei.saturating_add(half_step) / step;
    let scale = U256::from(10_000u64);
    let whole = ten_thousandths / scale;
    let frac = ten_thousandths % scale;

    format!("{}.{:0>4} {}", whole, frac.to_string(), NATIVE_SYMBOL)
}

/// Format a raw decimal wei string; malformed input degrades to `"0 ETH"`
pub fn format_balance(raw: &str) -> String {
    match U256::from_str_radix(raw.trim(), 10) {
        Ok(wei) if !raw.trim().is_empty() => format_ether_friendly(wei),
        _ => format!("0 {}", NATIVE_SYMBOL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const HEX: &[u8] = b"0123456789abcdefABCDEF";

    fn random_hex(rng: &mut StdRng, len: usize) -> String {
        (0..len)
            .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
            .collect()
    }

    #[test]
    fn test_valid_address_property() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let len = rng.gen_range(0..60);
            let prefix = match rng.gen_range(0..4) {
                0 => "0x",
                1 => "0X",
                2 => "",
                _ => "x0",
            };
            let candidate = format!("{}{}", prefix, random_hex(&mut rng, len));
            let expected = candidate.len() == 42 && candidate.starts_with("0x");
            assert_eq!(is_valid_address(&candidate), expected, "{}", candidate);
        }
    }

    #[test]
    fn test_valid_address_edges() {
        assert!(is_valid_address(&format!("0x{}", "a".repeat(40))));
        assert!(!is_valid_address(&format!("0x{}", "a".repeat(39))));
        assert!(!is_valid_address(&format!("0x{}", "a".repeat(41))));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("0x"));
        // length and prefix only
        assert!(is_valid_address(&format!("0x{}", "z".repeat(40))));
    }

    #[test]
    fn test_shorten_address() {
        let addr = format!("0x{}", "A".repeat(40));
        assert_eq!(shorten_address(&addr), "0xAAAA…AAAAAA");
        assert_eq!(
            shorten_address("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234…345678"
        );
        assert_eq!(shorten_address("0x12345678"), "0x12345678");
        assert_eq!(shorten_address(""), "");
    }

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("1").unwrap(), U256::from(WEI_PER_ETHER));
        assert_eq!(
            parse_ether("0.05").unwrap(),
            U256::from(50_000_000_000_000_000u128)
        );
        assert_eq!(
            parse_ether("0.005").unwrap(),
            U256::from(5_000_000_000_000_000u128)
        );
        assert_eq!(parse_ether(".5").unwrap(), U256::from(WEI_PER_ETHER / 2));
        assert_eq!(parse_ether("0").unwrap(), U256::ZERO);
        assert_eq!(
            parse_ether("0.000000000000000001").unwrap(),
            U256::from(1u64)
        );
    }

    #[test]
    fn test_parse_ether_rejects_garbage() {
        assert!(parse_ether("").is_err());
        assert!(parse_ether(".").is_err());
        assert!(parse_ether("-1").is_err());
        assert!(parse_ether("1.2.3").is_err());
        assert!(parse_ether("abc").is_err());
        assert!(parse_ether("0.0000000000000000001").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(U256::ZERO), "0.0");
        assert_eq!(format_ether(U256::from(WEI_PER_ETHER)), "1.0");
        assert_eq!(
            format_ether(U256::from(50_000_000_000_000_000u128)),
            "0.05"
        );
        assert_eq!(format_ether(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn test_format_friendly_dust() {
        assert_eq!(format_ether_friendly(U256::ZERO), "<0.0001");
        assert_eq!(
            format_ether_friendly(U256::from(DUST_THRESHOLD_WEI - 1)),
            "<0.0001"
        );
        assert_eq!(
            format_ether_friendly(U256::from(DUST_THRESHOLD_WEI)),
            "0.0001 ETH"
        );
    }

    #[test]
    fn test_format_friendly_values() {
        assert_eq!(format_ether_friendly(U256::from(WEI_PER_ETHER)), "1.0000 ETH");
        assert_eq!(
            format_ether_friendly(parse_ether("0.05").unwrap()),
            "0.0500 ETH"
        );
        assert_eq!(
            format_ether_friendly(parse_ether("12.34567").unwrap()),
            "12.3457 ETH"
        );
        assert_eq!(
            format_ether_friendly(parse_ether("0.99999").unwrap()),
            "1.0000 ETH"
        );
    }

    #[test]
    fn test_format_balance_degrades() {
        assert_eq!(format_balance("0"), "<0.0001");
        assert_eq!(format_balance("1000000000000000000"), "1.0000 ETH");
        assert_eq!(format_balance("not a number"), "0 ETH");
        assert_eq!(format_balance(""), "0 ETH");
        assert_eq!(format_balance("-5"), "0 ETH");
        assert_eq!(format_balance("1.5"), "0 ETH");
    }
}
