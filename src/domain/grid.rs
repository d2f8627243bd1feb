use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Point-of-connection power limits, typically symmetric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridLimits {
    pub import_limit_kw: f64,
    pub export_limit_kw: f64,
}

impl GridLimits {
    pub fn symmetric(limit_kw: f64) -> Self {
        Self {
            import_limit_kw: limit_kw,
            export_limit_kw: limit_kw,
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        for (name, v) in [
            ("import_limit_kw", self.import_limit_kw),
            ("export_limit_kw", self.export_limit_kw),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(DispatchError::Config(format!(
                    "{name} must be finite and positive, got {v}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for GridLimits {
    /// 3x200 A at 400 V, a common commercial point of connection.
    fn default() -> Self {
        Self::symmetric(138.0)
    }
}
