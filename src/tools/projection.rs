//! Compound-growth investment projection

use serde_json::{json, Value};
use tracing::debug;

use super::{format_usd, require_f64, Tool};
use crate::error::AdvisorError;
use crate::models::{ProjectionResult, ToolInput, ToolOutput};
use crate::Result;

pub const MAX_PROJECTION_YEARS: u32 = 100;

/// Future value of a lump sum plus fixed monthly contributions, compounded
/// monthly at `annual_rate / 12`.
///
/// `annual_rate` is a decimal (7% is `0.07`). A zero rate grows the
/// contributions linearly; negative rates above -100% shrink both terms.
pub fn calculate_investment_projection(
    principal: f64,
    monthly_contribution: f64,
    years: u32,
    annual_rate: f64,
) -> Result<ProjectionResult> {
    if !principal.is_finite() || !monthly_contribution.is_finite() || !annual_rate.is_finite() {
        return Err(AdvisorError::ValidationError(
            "Projection inputs must be finite numbers.".to_string(),
        ));
    }
    if principal < 0.0 || monthly_contribution < 0.0 {
        return Err(AdvisorError::ValidationError(
            "Principal and monthly contribution cannot be negative.".to_string(),
        ));
    }
    if annual_rate <= -1.0 {
        return Err(AdvisorError::ValidationError(
            "Annual rate must be greater than -100%.".to_string(),
        ));
    }
    if years > MAX_PROJECTION_YEARS {
        return Err(AdvisorError::ValidationError(format!(
            "Investment period cannot exceed {} years.",
            MAX_PROJECTION_YEARS
        )));
    }

    let monthly_rate = annual_rate / 12.0;
    let months = years as f64 * 12.0;
    let growth = (1.0 + monthly_rate).powf(months);

    let future_value_principal = principal * growth;
    let future_value_contributions = if monthly_rate.abs() < f64::EPSILON {
        monthly_contribution * months
    } else {
        monthly_contribution * ((growth - 1.0) / monthly_rate)
    };

    let future_value = future_value_principal + future_value_contributions;
    if !future_value.is_finite() {
        return Err(AdvisorError::ValidationError(
            "The projected value is too large to calculate. Try a lower rate.".to_string(),
        ));
    }

    Ok(ProjectionResult {
        principal,
        monthly_contribution,
        years,
        annual_rate,
        future_value_principal,
        future_value_contributions,
        future_value,
    })
}

/// Presentation form of a projection.
pub fn render_projection(result: &ProjectionResult) -> Value {
    json!({
        "initial_principal": format_usd(result.principal),
        "monthly_contribution": format_usd(result.monthly_contribution),
        "investment_period_years": result.years,
        "estimated_annual_rate_percent": format!("{:.1}%", result.annual_rate * 100.0),
        "projected_future_value": format_usd(result.future_value),
        "future_value_principal": round_cents(result.future_value_principal),
        "future_value_contributions": round_cents(result.future_value_contributions),
        "future_value": round_cents(result.future_value),
    })
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn require_years(input: &ToolInput) -> Result<u32> {
    let years = require_f64(input, "years")?;
    if years < 0.0 || years.fract() != 0.0 || years > u32::MAX as f64 {
        return Err(AdvisorError::ValidationError(
            "Years must be a whole, non-negative number.".to_string(),
        ));
    }
    Ok(years as u32)
}

pub struct InvestmentProjectionTool;

#[async_trait::async_trait]
impl Tool for InvestmentProjectionTool {
    fn name(&self) -> &'static str {
        "calculate_investment_projection"
    }

    fn description(&self) -> &'static str {
        "Calculates the future value of an investment. 'annual_rate' should be a decimal \
         (e.g., 7% is 0.07). Returns a JSON string with the projection details."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "principal": {"type": "number", "description": "Initial amount invested"},
                "monthly_contribution": {"type": "number", "description": "Amount added every month"},
                "years": {"type": "integer", "description": "Investment period in years"},
                "annual_rate": {"type": "number", "description": "Expected annual return as a decimal"}
            },
            "required": ["principal", "monthly_contribution", "years", "annual_rate"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let result = calculate_investment_projection(
            require_f64(input, "principal")?,
            require_f64(input, "monthly_contribution")?,
            require_years(input)?,
            require_f64(input, "annual_rate")?,
        )?;

        debug!(future_value = result.future_value, "Calculated investment projection");

        Ok(ToolOutput {
            data: serde_json::to_value(result)?,
            text: serde_json::to_string_pretty(&render_projection(&result))?,
        })
    }
}
