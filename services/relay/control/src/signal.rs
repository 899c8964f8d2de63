//! Coarse signal quality derived from the modem network type.

use std::fmt;

/// Signal quality label reported to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalQuality {
    /// No data service
    NoData,
    /// GPRS
    Gprs,
    /// EDGE
    Edge,
    /// 3G (UMTS)
    ThreeG,
    /// HSDPA / HSPA+ or better
    HPlus,
}

impl SignalQuality {
    /// Label as sent on the wire
    pub fn label(self) -> &'static str {
        match self {
            SignalQuality::NoData => "NODATA",
            SignalQuality::Gprs => "GPRS",
            SignalQuality::Edge => "EDGE",
            SignalQuality::ThreeG => "3G",
            SignalQuality::HPlus => "H/H+",
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a raw network type (as returned by `AT^SYSINFO`) to a signal label.
///
/// The ranges cover every integer, so there is no "unknown" outcome.
pub fn classify(network_type: Option<i32>) -> SignalQuality {
    match network_type {
        None => SignalQuality::NoData,
        Some(n) if n < 2 => SignalQuality::NoData,
        Some(2) => SignalQuality::Gprs,
        Some(3) => SignalQuality::Edge,
        Some(4) => SignalQuality::ThreeG,
        Some(_) => SignalQuality::HPlus,
    }
}
