//! Three-year rolling transforms over year columns.
//!
//! Windows are selected by year label, not position, so a gap in the
//! panel's years shortens the window rather than shifting it. Missing
//! values are skipped; a window with no values at all yields a missing
//! cell.

use crate::{Panel, PanelError, Year};

/// Three-year lagged mean: the value for year `y` is the mean of years
/// `y-3..=y-1`.
///
/// Output years are every panel year from the fourth onward, plus one year
/// past the last (an estimate for the current year built only from
/// history). Every entity of the input appears in the output.
///
/// # Errors
///
/// Returns [`PanelError::InsufficientHistory`] if the panel has fewer than
/// four year columns.
pub fn panel_to_3lag<K: Ord + Clone>(panel: &Panel<K>) -> Result<Panel<K>, PanelError> {
    let mut years = output_years(panel, "panel_to_3lag", 3)?;
    if let Some(last) = panel.years().iter().next_back() {
        years.push(last + 1);
    }
    Ok(rolling(panel, &years, 3, 1))
}

/// Three-year trailing mean without lag: the value for year `y` is the
/// mean of years `y-2..=y`.
///
/// Output years are every panel year from the third onward.
///
/// # Errors
///
/// Returns [`PanelError::InsufficientHistory`] if the panel has fewer than
/// three year columns.
pub fn panel_to_3nolag<K: Ord + Clone>(panel: &Panel<K>) -> Result<Panel<K>, PanelError> {
    let years = output_years(panel, "panel_to_3nolag", 2)?;
    Ok(rolling(panel, &years, 2, 0))
}

fn output_years<K: Ord + Clone>(
    panel: &Panel<K>,
    transform: &'static str,
    skip: usize,
) -> Result<Vec<Year>, PanelError> {
    let available = panel.years().len();
    if available <= skip {
        return Err(PanelError::InsufficientHistory {
            transform,
            required: skip + 1,
            available,
        });
    }
    Ok(panel.years().iter().skip(skip).copied().collect())
}

/// Window for output year `y` is `y - back ..= y - lag`.
fn rolling<K: Ord + Clone>(panel: &Panel<K>, years: &[Year], back: Year, lag: Year) -> Panel<K> {
    let mut out = Panel::new();
    for &year in years {
        out.add_year(year);
    }
    for key in panel.entities() {
        for &year in years {
            let value = panel.window_mean(key, year - back, year - lag);
            out.set(key.clone(), year, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Years 2010–2013, every entity holding 1, 2, 3, 4.
    fn ramp() -> Panel<&'static str> {
        let mut panel = Panel::new();
        for key in ["a", "b"] {
            for (i, year) in (2010..=2013).enumerate() {
                panel.set(key, year, Some(f64::from(u8::try_from(i).unwrap() + 1)));
            }
        }
        panel
    }

    #[test]
    fn lag_uses_three_prior_years_and_adds_forecast_year() {
        let out = panel_to_3lag(&ramp()).unwrap();
        assert_eq!(out.years().iter().copied().collect::<Vec<_>>(), vec![2013, 2014]);
        assert_eq!(out.get(&"a", 2013), Some(2.0));
        assert_eq!(out.get(&"a", 2014), Some(3.0));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn nolag_ends_window_at_target_year() {
        let out = panel_to_3nolag(&ramp()).unwrap();
        assert_eq!(out.years().iter().copied().collect::<Vec<_>>(), vec![2012, 2013]);
        assert_eq!(out.get(&"b", 2012), Some(2.0));
        assert_eq!(out.get(&"b", 2013), Some(3.0));
        assert_eq!(out.get(&"b", 2011), None);
    }

    // Skip-missing with at least one value is a chosen policy, not a
    // confirmed contract of the upstream analysis.
    #[test]
    fn lag_skips_missing_values() {
        let mut panel = ramp();
        panel.set("a", 2011, None);
        let out = panel_to_3lag(&panel).unwrap();
        assert_eq!(out.get(&"a", 2013), Some(2.0));
        assert_eq!(out.get(&"a", 2014), Some(3.5));
    }

    #[test]
    fn all_missing_window_stays_missing() {
        let mut panel = ramp();
        panel.set("c", 2010, None);
        panel.set("c", 2013, Some(9.0));
        let out = panel_to_3lag(&panel).unwrap();
        assert!(out.contains(&"c"));
        assert_eq!(out.get(&"c", 2013), None);
        assert_eq!(out.get(&"c", 2014), Some(9.0));
    }

    #[test]
    fn short_panels_are_rejected() {
        let mut panel = Panel::new();
        panel.set("a", 2010, Some(1.0));
        panel.set("a", 2011, Some(1.0));
        panel.set("a", 2012, Some(1.0));
        assert!(matches!(
            panel_to_3lag(&panel),
            Err(PanelError::InsufficientHistory { required: 4, available: 3, .. })
        ));
        assert!(panel_to_3nolag(&panel).is_ok());
    }

    #[test]
    fn windows_follow_year_labels_across_gaps() {
        let mut panel = Panel::new();
        for (year, v) in [(2008, 1.0), (2010, 2.0), (2011, 3.0), (2012, 4.0)] {
            panel.set("a", year, Some(v));
        }
        let out = panel_to_3nolag(&panel).unwrap();
        // 2011 window is 2009..=2011 -> {2010, 2011}
        assert_eq!(out.get(&"a", 2011), Some(2.5));
    }
}
