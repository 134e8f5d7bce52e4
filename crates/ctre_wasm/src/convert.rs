//! Conversions between flat JS-friendly inputs and core model types.

use anyhow::{anyhow, bail, Context, Result};
use ctre_core::{DecayingShock, Forcing, LinearModel};
use serde::Serialize;
use wasm_bindgen::JsValue;

/// Recovers `n` from a row-major `n×n` matrix length.
pub(crate) fn infer_dimension(len: usize) -> Result<usize> {
    let dim = (len as f64).sqrt().round() as usize;
    if dim == 0 || dim * dim != len {
        bail!("Dynamics matrix has {len} entries, which is not a non-empty square.");
    }
    Ok(dim)
}

pub(crate) fn build_model(dynamics: Vec<f64>, n_states: usize) -> Result<LinearModel> {
    let dim = infer_dimension(dynamics.len())?;
    if n_states > dim {
        bail!("n_states ({n_states}) exceeds the model dimension ({dim}).");
    }
    let model = LinearModel::new(dynamics, n_states, dim - n_states);
    model.validate().context("Invalid dynamics matrix")?;
    Ok(model)
}

/// Replaces the long-run level, keeping any decaying shocks.
pub(crate) fn with_level(model: &LinearModel, level: Vec<f64>) -> Result<Forcing> {
    let forcing = match &model.forcing {
        Forcing::Decaying { shocks, .. } => Forcing::Decaying {
            level,
            shocks: shocks.clone(),
        },
        _ => Forcing::Constant { level },
    };
    forcing
        .validate(model.dimension())
        .context("Invalid forcing level")?;
    Ok(forcing)
}

pub(crate) fn with_shock(model: &LinearModel, impulse: Vec<f64>, decay: f64) -> Result<Forcing> {
    let dim = model.dimension();
    let shock = DecayingShock { impulse, decay };
    let forcing = match &model.forcing {
        Forcing::Zero => Forcing::Decaying {
            level: vec![0.0; dim],
            shocks: vec![shock],
        },
        Forcing::Constant { level } => Forcing::Decaying {
            level: level.clone(),
            shocks: vec![shock],
        },
        Forcing::Decaying { level, shocks } => {
            let mut shocks = shocks.clone();
            shocks.push(shock);
            Forcing::Decaying {
                level: level.clone(),
                shocks,
            }
        }
        Forcing::Sampled { .. } => {
            return Err(anyhow!(
                "Cannot add a decaying shock to a sampled forcing path."
            ))
        }
    };
    forcing.validate(dim).context("Invalid decaying shock")?;
    Ok(forcing)
}

/// Builds a sampled forcing from row-major `values` (one row per time).
pub(crate) fn sampled_forcing(times: Vec<f64>, values: &[f64], dim: usize) -> Result<Forcing> {
    if values.len() != times.len() * dim {
        bail!(
            "Sampled forcing expects {} values ({} times x {} variables), got {}.",
            times.len() * dim,
            times.len(),
            dim,
            values.len()
        );
    }
    let forcing = Forcing::Sampled {
        values: values.chunks(dim).map(|row| row.to_vec()).collect(),
        times,
    };
    forcing.validate(dim).context("Invalid sampled forcing")?;
    Ok(forcing)
}

pub(crate) fn to_js<T: Serialize>(value: &T, what: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize {what}: {err}")))
}

pub(crate) fn js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {err:#}"))
}
