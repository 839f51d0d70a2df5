//! Admission control driven by queue usage reports.

/// Decides whether new sends are admitted from the queue fill ratio.
///
/// Admission stops once usage rises above the high watermark and resumes
/// when it falls to or below the low watermark. Both default to 50%.
///
/// # Examples
///
/// ```
/// use msrpframe::outbound::AdmissionGate;
/// let mut gate = AdmissionGate::default();
/// assert_eq!(gate.update(0.6), Some(false));
/// assert_eq!(gate.update(0.55), None);
/// assert_eq!(gate.update(0.5), Some(true));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdmissionGate {
    high: f64,
    low: f64,
    admitting: bool,
}

impl Default for AdmissionGate {
    fn default() -> Self { Self::with_watermarks(0.5, 0.5) }
}

impl AdmissionGate {
    /// Gate with explicit watermarks; `low` is clamped to at most `high`.
    #[must_use]
    pub fn with_watermarks(high: f64, low: f64) -> Self {
        Self {
            high,
            low: low.min(high),
            admitting: true,
        }
    }

    /// Whether new sends are currently admitted.
    #[must_use]
    pub fn is_admitting(&self) -> bool { self.admitting }

    /// Feed a usage report. Returns the new admission state when it changed.
    pub fn update(&mut self, usage: f64) -> Option<bool> {
        let next = if self.admitting {
            usage <= self.high
        } else {
            usage <= self.low
        };
        if next == self.admitting {
            return None;
        }
        self.admitting = next;
        Some(next)
    }
}
