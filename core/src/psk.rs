//! PSK constellation mapping
//!
//! Symbols are integers in `[0, order)`. Every constellation point has unit
//! magnitude; demodulation is a nearest-phase decision.

use crate::error::{ModemError, Result};
use num_complex::Complex32;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

const QPSK_PHASES: [f32; 4] = [FRAC_PI_4, 7.0 * FRAC_PI_4, 3.0 * FRAC_PI_4, 5.0 * FRAC_PI_4];

/// Quadrant index (counted from -pi) back to the QPSK symbol
const QPSK_INDEX: [u32; 4] = [3, 1, 0, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PskOrder {
    Bpsk,
    Qpsk,
    Psk8,
}

impl TryFrom<usize> for PskOrder {
    type Error = ModemError;

    fn try_from(order: usize) -> Result<Self> {
        match order {
            2 => Ok(PskOrder::Bpsk),
            4 => Ok(PskOrder::Qpsk),
            8 => Ok(PskOrder::Psk8),
            other => Err(ModemError::UnsupportedModulationOrder(other)),
        }
    }
}

impl PskOrder {
    pub fn order(self) -> usize {
        match self {
            PskOrder::Bpsk => 2,
            PskOrder::Qpsk => 4,
            PskOrder::Psk8 => 8,
        }
    }

    pub fn bits_per_symbol(self) -> usize {
        match self {
            PskOrder::Bpsk => 1,
            PskOrder::Qpsk => 2,
            PskOrder::Psk8 => 3,
        }
    }

    /// Map symbols onto constellation points.
    pub fn modulate(self, symbols: &[u32]) -> Result<Vec<Complex32>> {
        symbols
            .iter()
            .map(|&symbol| {
                if symbol as usize >= self.order() {
                    return Err(ModemError::InvalidSymbol {
                        symbol,
                        order: self.order(),
                    });
                }
                Ok(Complex32::from_polar(1.0, self.phase_of(symbol)))
            })
            .collect()
    }

    /// Nearest-phase decision for each received point.
    pub fn demodulate(self, points: &[Complex32]) -> Vec<u32> {
        points.iter().map(|&point| self.decide(point)).collect()
    }

    fn phase_of(self, symbol: u32) -> f32 {
        match self {
            PskOrder::Bpsk => symbol as f32 * PI,
            PskOrder::Qpsk => QPSK_PHASES[symbol as usize],
            PskOrder::Psk8 => {
                // Position on the circle whose Gray code is `symbol`
                let mut k = symbol;
                k ^= k >> 1;
                k ^= k >> 2;
                k as f32 * FRAC_PI_4
            }
        }
    }

    fn decide(self, point: Complex32) -> u32 {
        let angle = point.im.atan2(point.re);
        match self {
            PskOrder::Bpsk => {
                if point.re >= 0.0 {
                    0
                } else {
                    1
                }
            }
            PskOrder::Qpsk => {
                let quadrant = ((angle + PI - FRAC_PI_4) / FRAC_PI_2).round() as i32;
                QPSK_INDEX[quadrant.rem_euclid(4) as usize]
            }
            PskOrder::Psk8 => {
                let k = (angle / FRAC_PI_4).round() as i32;
                let k = k.rem_euclid(8) as u32;
                k ^ (k >> 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ORDERS: [PskOrder; 3] = [PskOrder::Bpsk, PskOrder::Qpsk, PskOrder::Psk8];

    #[test]
    fn test_try_from_order() {
        assert_eq!(PskOrder::try_from(2).unwrap(), PskOrder::Bpsk);
        assert_eq!(PskOrder::try_from(4).unwrap(), PskOrder::Qpsk);
        assert_eq!(PskOrder::try_from(8).unwrap(), PskOrder::Psk8);
        assert!(matches!(
            PskOrder::try_from(16),
            Err(ModemError::UnsupportedModulationOrder(16))
        ));
        assert!(PskOrder::try_from(0).is_err());
    }

    #[test]
    fn test_bits_match_order() {
        for psk in ALL_ORDERS {
            assert_eq!(1 << psk.bits_per_symbol(), psk.order());
        }
    }

    #[test]
    fn test_round_trip_every_symbol() {
        for psk in ALL_ORDERS {
            let symbols: Vec<u32> = (0..psk.order() as u32).collect();
            let points = psk.modulate(&symbols).unwrap();
            for point in &points {
                assert!((point.norm() - 1.0).abs() < 1e-5);
            }
            assert_eq!(psk.demodulate(&points), symbols, "{:?}", psk);
        }
    }

    #[test]
    fn test_qpsk_phase_table() {
        let points = PskOrder::Qpsk.modulate(&[0, 1, 2, 3]).unwrap();
        let h = std::f32::consts::FRAC_1_SQRT_2;
        let expected = [(h, h), (h, -h), (-h, h), (-h, -h)];
        for (point, (re, im)) in points.iter().zip(expected) {
            assert!((point.re - re).abs() < 1e-5);
            assert!((point.im - im).abs() < 1e-5);
        }
    }

    #[test]
    fn test_qpsk_tolerates_small_rotation() {
        let symbols = vec![0, 1, 2, 3, 3, 2, 1, 0];
        let rotation = Complex32::from_polar(1.0, 0.3);
        let points: Vec<Complex32> = PskOrder::Qpsk
            .modulate(&symbols)
            .unwrap()
            .into_iter()
            .map(|p| p * rotation * 0.01)
            .collect();
        assert_eq!(PskOrder::Qpsk.demodulate(&points), symbols);
    }

    #[test]
    fn test_qpsk_negative_real_axis_stays_in_range() {
        // atan2 == pi lands on the wrap-around quadrant
        let symbols = PskOrder::Qpsk.demodulate(&[Complex32::new(-1.0, 0.0)]);
        assert_eq!(symbols.len(), 1);
        assert!(symbols[0] < 4);
    }

    #[test]
    fn test_psk8_neighbours_differ_by_one_bit() {
        let symbols: Vec<u32> = (0..8).collect();
        let points = PskOrder::Psk8.modulate(&symbols).unwrap();
        let mut by_phase: Vec<(f32, u32)> = points
            .iter()
            .zip(&symbols)
            .map(|(p, &s)| (p.im.atan2(p.re).rem_euclid(2.0 * PI), s))
            .collect();
        by_phase.sort_by(|a, b| a.0.total_cmp(&b.0));
        for i in 0..8 {
            let a = by_phase[i].1;
            let b = by_phase[(i + 1) % 8].1;
            assert_eq!((a ^ b).count_ones(), 1, "{} and {}", a, b);
        }
    }

    #[test]
    fn test_modulate_rejects_out_of_range_symbol() {
        let err = PskOrder::Qpsk.modulate(&[0, 4]).unwrap_err();
        assert!(matches!(
            err,
            ModemError::InvalidSymbol { symbol: 4, order: 4 }
        ));
        assert!(PskOrder::Bpsk.modulate(&[2]).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(PskOrder::Psk8.modulate(&[]).unwrap().is_empty());
        assert!(PskOrder::Psk8.demodulate(&[]).is_empty());
    }
}
