//! Economic impact model.
//!
//! Maps an aggregate stream count to revenue, GDP contribution, jobs and
//! export value using multiplicative coefficients passed in explicitly.

use crate::config::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Coefficients for [`compute`]. All values must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicParameters {
    /// Payout per stream (USD)
    pub revenue_per_stream: f64,
    /// Downstream effects multiplier applied to direct revenue
    pub gdp_multiplier: f64,
    /// Jobs supported per million USD of revenue
    pub jobs_per_million_revenue: f64,
    /// Fraction of revenue earned abroad
    pub export_share: f64,
}

impl Default for EconomicParameters {
    fn default() -> Self {
        Self {
            revenue_per_stream: 0.003,
            gdp_multiplier: 1.75,
            jobs_per_million_revenue: 50.0,
            export_share: 0.42,
        }
    }
}

impl EconomicParameters {
    pub fn new(
        revenue_per_stream: f64,
        gdp_multiplier: f64,
        jobs_per_million_revenue: f64,
        export_share: f64,
    ) -> Result<Self, ConfigurationError> {
        let params = Self {
            revenue_per_stream,
            gdp_multiplier,
            jobs_per_million_revenue,
            export_share,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fields = [
            ("economics.revenue_per_stream", self.revenue_per_stream),
            ("economics.gdp_multiplier", self.gdp_multiplier),
            ("economics.jobs_per_million_revenue", self.jobs_per_million_revenue),
            ("economics.export_share", self.export_share),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("must be a positive number, got {}", value),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicImpact {
    pub revenue: f64,
    pub gdp_contribution: f64,
    pub jobs_supported: u64,
    pub export_value: f64,
}

/// Derives KPIs from a total stream count. Pure and deterministic.
pub fn compute(total_streams: u64, params: &EconomicParameters) -> EconomicImpact {
    let revenue = total_streams as f64 * params.revenue_per_stream;
    let jobs = (revenue / 1_000_000.0 * params.jobs_per_million_revenue).floor();

    EconomicImpact {
        revenue,
        gdp_contribution: revenue * params.gdp_multiplier,
        jobs_supported: jobs.max(0.0) as u64,
        export_value: revenue * params.export_share,
    }
}
