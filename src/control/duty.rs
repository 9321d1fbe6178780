//! Heater duty planner.
//!
//! Converts the regulator's demand percentage into per-heater burn
//! times by wattage budgeting, then time-slices each PID window into
//! short on/off bursts:
//!
//! ```text
//!   demand % ──▶ watts needed ──▶ walk heaters by preference
//!                                  │ full window for big deficits
//!                                  │ partial window for the remainder
//!                                  ▼
//!   relay-guard rounding ──▶ burn_time % ──▶ 1 Hz slice predicate
//! ```
//!
//! Splitting the window into `heater_cycles` sub-windows distributes
//! the heat and avoids localized hot spots.

use crate::model::Heater;

/// Derive each heater's run-mode participation and return the summed
/// wattage of the enabled set. Call once at run start.
pub fn select_heaters(heaters: &mut [Heater], boil_run: bool) -> u32 {
    let mut total = 0;
    for heater in heaters.iter_mut() {
        heater.enabled = if boil_run {
            heater.use_for_boil
        } else {
            heater.use_for_mash
        };
        if heater.enabled {
            total += heater.watt;
        }
    }
    total
}

/// Relay-guard rounding with guard value `g` (percent of a window).
///
/// Tiny duties collapse to zero and near-full duties to 100, so an
/// active window always carries at least `g` percent of either on or
/// off time. Prevents relay chatter at the extremes.
pub fn guard_round(burn: u8, guard: u8) -> u8 {
    let mut burn = burn;
    if burn <= guard / 2 {
        burn = 0;
    } else if burn <= guard {
        burn = guard;
    }
    if burn >= 100 - guard / 2 {
        burn = 100;
    } else if burn >= 100 - guard {
        burn = 100 - guard;
    }
    burn
}

/// Distribute a demand percentage across the heater list.
///
/// Heaters must already be in preference order. Each heater that
/// cannot cover the remaining wattage alone burns the full window;
/// the first heater that can cover it gets a partial, guard-rounded
/// window and the rest stay off.
pub fn plan_burn_times(
    heaters: &mut [Heater],
    total_wattage: u32,
    output_percent: u8,
    relay_guard: u8,
) {
    for heater in heaters.iter_mut() {
        heater.burn_time = 0;
    }

    let mut output_watt = (i64::from(total_wattage) / 100) * i64::from(output_percent);

    for heater in heaters.iter_mut() {
        if !heater.enabled {
            continue;
        }
        if output_watt <= 0 {
            break;
        }

        let watt = i64::from(heater.watt);
        if watt > output_watt {
            let burn = (output_watt * 100 / watt) as u8;
            heater.burn_time = guard_round(burn, relay_guard);
            break;
        }
        heater.burn_time = 100;
        output_watt -= watt;
    }
}

/// 1 Hz slice predicate: is a heater with the given burn time on at
/// `second` seconds into the PID window?
///
/// The window subdivides into `heater_cycles` sub-windows of length
/// `L = pid_loop_time / heater_cycles`; within each the heater is on
/// for the first `burn_time% × L` seconds.
pub fn slice_is_on(burn_time: u8, pid_loop_time: u16, heater_cycles: u8, second: u16) -> bool {
    if burn_time == 0 {
        return false;
    }
    let sub_window = (pid_loop_time / u16::from(heater_cycles.max(1))).max(1);
    let burn_until = f64::from(burn_time) / 100.0 * f64::from(sub_window);
    burn_until > f64::from(second % sub_window)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// After guard rounding, no burn time lands inside the
        /// forbidden bands (0, g) or (100-g, 100).
        #[test]
        fn guard_bands_are_empty(burn in 0u8..=100, guard in 0u8..=50) {
            let rounded = guard_round(burn, guard);
            prop_assert!(rounded <= 100);
            if guard > 0 {
                prop_assert!(rounded == 0 || rounded >= guard,
                    "burn {burn} guard {guard} -> {rounded}");
                prop_assert!(rounded == 100 || rounded <= 100 - guard,
                    "burn {burn} guard {guard} -> {rounded}");
            }
        }

        /// The planned burn never exceeds the wattage budget.
        #[test]
        fn planned_power_within_budget(
            watts in proptest::collection::vec(100u32..4000, 1..6),
            demand in 0u8..=100,
        ) {
            let mut heaters: Vec<Heater> = watts.iter().enumerate().map(|(i, w)| {
                let mut h = Heater::new(i as u8 + 1, "h", 30, i as u8 + 1, *w);
                h.enabled = true;
                h
            }).collect();
            let total: u32 = watts.iter().sum();
            plan_burn_times(&mut heaters, total, demand, 0);

            let planned: u64 = heaters
                .iter()
                .map(|h| u64::from(h.burn_time) * u64::from(h.watt))
                .sum::<u64>() / 100;
            prop_assert!(planned <= u64::from(total),
                "planned {planned} W exceeds total {total} W");
        }

        /// Slicing yields on-time proportional to burn_time within one
        /// sub-window granularity.
        #[test]
        fn slice_on_time_tracks_burn_time(
            burn in 0u8..=100,
            cycles in 1u8..=6,
        ) {
            let window = 60u16;
            let on: u16 = (0..window).filter(|&s| slice_is_on(burn, window, cycles, s)).count() as u16;
            let expected = f64::from(burn) / 100.0 * f64::from(window);
            let tolerance = f64::from(cycles);
            prop_assert!((f64::from(on) - expected).abs() <= tolerance,
                "burn {burn}% cycles {cycles}: {on}s on vs {expected}s expected");
        }
    }
}
