//! Explicit conversion points between exact wei amounts and the `f64`
//! ether values used in risk scoring and reporting.
//!
//! Precision loss above ~2^53 wei of the fractional part is acceptable in
//! the scoring domain; anything that goes back on the wire stays `U256`.

use ethers::types::U256;

const WEI_PER_ETH: f64 = 1e18;
const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Lossy conversion for scoring and display. Values beyond 128 bits
/// saturate rather than panic.
pub fn wei_to_eth(wei: U256) -> f64 {
    if wei.bits() > 128 {
        return f64::MAX;
    }
    wei.as_u128() as f64 / WEI_PER_ETH
}

/// Inverse of [`wei_to_eth`]; negative or non-finite inputs clamp to zero.
pub fn eth_to_wei(eth: f64) -> U256 {
    if !eth.is_finite() || eth <= 0.0 {
        return U256::zero();
    }
    U256::from((eth * WEI_PER_ETH) as u128)
}

pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei) * U256::from(WEI_PER_GWEI)
}

pub fn wei_to_gwei(wei: U256) -> u64 {
    (wei / U256::from(WEI_PER_GWEI)).as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_tolerance() {
        let one_eth = U256::exp10(18);
        assert!((wei_to_eth(one_eth) - 1.0).abs() < 1e-12);
        assert_eq!(eth_to_wei(1.0), one_eth);

        let small = 0.0025;
        let back = wei_to_eth(eth_to_wei(small));
        assert!((back - small).abs() < 1e-9);
    }

    #[test]
    fn negative_eth_clamps_to_zero() {
        assert_eq!(eth_to_wei(-1.0), U256::zero());
        assert_eq!(eth_to_wei(f64::NAN), U256::zero());
    }

    #[test]
    fn gwei_conversions() {
        assert_eq!(gwei_to_wei(30), U256::from(30_000_000_000u64));
        assert_eq!(wei_to_gwei(U256::from(30_000_000_000u64)), 30);
    }
}
