//! OI/supply ratio classification
//!
//! Maps the open interest / circulating supply ratio (in percent) to a leverage
//! signal and a normalised bar fill.

/// Ratios below this are `Low`
pub const LOW_THRESHOLD: f64 = 1.0;
/// Ratios at or above this are `High`
pub const HIGH_THRESHOLD: f64 = 3.0;
/// Ratio at which the bar is full
pub const BAR_FULL_SCALE: f64 = 5.0;
/// Tick labels under the ratio bar
pub const BAR_TICKS: [&str; 5] = ["0%", "1%", "2%", "3%", "5%+"];

/// Leverage signal derived from the ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// No supply data
    NotAvailable,
    Low,
    Mid,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NotAvailable => "N/A",
            Severity::Low => "LOW",
            Severity::Mid => "MID",
            Severity::High => "HIGH",
        }
    }

    /// Signal sentence shown under the ratio bar
    pub fn signal_text(&self) -> &'static str {
        match self {
            Severity::NotAvailable => "No supply data",
            Severity::Low => "Low leverage - market calm",
            Severity::Mid => "Moderate leverage - be careful",
            Severity::High => "High leverage - squeeze risk!",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq)]
pub struct RatioSignal {
    /// "N/A" or the ratio with 3 decimals and a percent sign ("2.500%")
    pub display_text: String,
    pub severity: Severity,
    /// Bar fill in [0, 1]
    pub bar_fraction: f64,
}

/// Classify a ratio. Non-finite values count as absent.
pub fn classify(ratio: Option<f64>) -> RatioSignal {
    let Some(ratio) = ratio.filter(|r| r.is_finite()) else {
        return RatioSignal {
            display_text: "N/A".to_string(),
            severity: Severity::NotAvailable,
            bar_fraction: 0.0,
        };
    };

    let severity = if ratio < LOW_THRESHOLD {
        Severity::Low
    } else if ratio < HIGH_THRESHOLD {
        Severity::Mid
    } else {
        Severity::High
    };

    RatioSignal {
        display_text: format!("{:.3}%", ratio),
        severity,
        bar_fraction: (ratio / BAR_FULL_SCALE).clamp(0.0, 1.0),
    }
}
