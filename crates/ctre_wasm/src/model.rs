//! WASM wrapper around a linear rational-expectations model.

use crate::convert::{build_model, js_error, sampled_forcing, to_js, with_level, with_shock};
use ctre_core::{
    analyze_spectrum, policy_rule, simulate, solve, BoundaryConditions, Forcing, LinearModel,
    SolverSettings, TimeGrid,
};
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmLinearModel {
    pub(crate) model: LinearModel,
    pub(crate) settings: SolverSettings,
}

#[wasm_bindgen]
impl WasmLinearModel {
    /// `dynamics` is the row-major `n×n` matrix; the first `n_states`
    /// variables are predetermined, the rest are jumps.
    #[wasm_bindgen(constructor)]
    pub fn new(dynamics: Vec<f64>, n_states: u32) -> Result<WasmLinearModel, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model(dynamics, n_states as usize)
            .map_err(|e| js_error("Model construction failed", e))?;
        Ok(WasmLinearModel {
            model,
            settings: SolverSettings::default(),
        })
    }

    pub fn dimension(&self) -> u32 {
        self.model.dimension() as u32
    }

    pub fn n_states(&self) -> u32 {
        self.model.n_states as u32
    }

    pub fn set_constant_forcing(&mut self, level: Vec<f64>) -> Result<(), JsValue> {
        self.model.forcing =
            with_level(&self.model, level).map_err(|e| js_error("Forcing update failed", e))?;
        Ok(())
    }

    pub fn add_decaying_shock(&mut self, impulse: Vec<f64>, decay: f64) -> Result<(), JsValue> {
        self.model.forcing = with_shock(&self.model, impulse, decay)
            .map_err(|e| js_error("Forcing update failed", e))?;
        Ok(())
    }

    /// `values` holds one row of `n` forcing values per entry of `times`.
    pub fn set_sampled_forcing(
        &mut self,
        times: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<(), JsValue> {
        self.model.forcing = sampled_forcing(times, &values, self.model.dimension())
            .map_err(|e| js_error("Forcing update failed", e))?;
        Ok(())
    }

    pub fn clear_forcing(&mut self) {
        self.model.forcing = Forcing::Zero;
    }

    pub fn set_tolerances(
        &mut self,
        stability: f64,
        imaginary: f64,
        max_condition: f64,
    ) -> Result<(), JsValue> {
        let settings = SolverSettings {
            stability_tolerance: stability,
            imaginary_tolerance: imaginary,
            max_condition,
            ..self.settings
        };
        settings
            .validate()
            .map_err(|e| js_error("Invalid tolerances", e))?;
        self.settings = settings;
        Ok(())
    }

    pub fn analyze(&self) -> Result<JsValue, JsValue> {
        let report = analyze_spectrum(&self.model, &self.settings)
            .map_err(|e| js_error("Spectrum analysis failed", e))?;
        to_js(&report, "spectrum report")
    }

    pub fn policy_rule(&self) -> Result<JsValue, JsValue> {
        let rule = policy_rule(&self.model, &self.settings)
            .map_err(|e| js_error("Policy rule failed", e))?;
        to_js(&rule, "policy rule")
    }

    pub fn solve_steady_state(
        &self,
        initial_state: Vec<f64>,
        horizon: f64,
        steps: u32,
    ) -> Result<JsValue, JsValue> {
        let boundary = BoundaryConditions::steady_state(initial_state);
        let grid = TimeGrid::uniform(horizon, steps as usize);
        let trajectory = solve(&self.model, &boundary, &grid, &self.settings)
            .map_err(|e| js_error("Saddle-path solve failed", e))?;
        to_js(&trajectory, "trajectory")
    }

    pub fn solve_terminal(
        &self,
        initial_state: Vec<f64>,
        terminal_jumps: Vec<f64>,
        horizon: f64,
        steps: u32,
    ) -> Result<JsValue, JsValue> {
        let boundary = BoundaryConditions::fixed(initial_state, horizon, terminal_jumps);
        let grid = TimeGrid::uniform(horizon, steps as usize);
        let trajectory = solve(&self.model, &boundary, &grid, &self.settings)
            .map_err(|e| js_error("Saddle-path solve failed", e))?;
        to_js(&trajectory, "trajectory")
    }

    pub fn simulate(
        &self,
        initial: Vec<f64>,
        horizon: f64,
        steps: u32,
        substeps: u32,
    ) -> Result<JsValue, JsValue> {
        let grid = TimeGrid::uniform(horizon, steps as usize);
        let trajectory = simulate(&self.model, &initial, &grid, substeps as usize)
            .map_err(|e| js_error("Simulation failed", e))?;
        to_js(&trajectory, "trajectory")
    }
}

/// Solves a fully serialized problem: `LinearModel`, `BoundaryConditions`,
/// `TimeGrid` and optional `SolverSettings` (`undefined` selects defaults).
#[wasm_bindgen]
pub fn solve_model(
    model: JsValue,
    boundary: JsValue,
    grid: JsValue,
    settings: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let model: LinearModel = from_value(model).map_err(|e| js_error("Invalid model", e))?;
    let boundary: BoundaryConditions =
        from_value(boundary).map_err(|e| js_error("Invalid boundary conditions", e))?;
    let grid: TimeGrid = from_value(grid).map_err(|e| js_error("Invalid time grid", e))?;
    let settings: SolverSettings = if settings.is_undefined() || settings.is_null() {
        SolverSettings::default()
    } else {
        from_value(settings).map_err(|e| js_error("Invalid settings", e))?
    };

    let trajectory = solve(&model, &boundary, &grid, &settings)
        .map_err(|e| js_error("Saddle-path solve failed", e))?;
    to_js(&trajectory, "trajectory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_model_splits_dimension() {
        let model = WasmLinearModel::new(vec![1.0, -2.0, -1.0, 1.0], 1).expect("model");
        assert_eq!(model.dimension(), 2);
        assert_eq!(model.n_states(), 1);
    }

    #[test]
    fn forcing_setters_update_core_model() {
        let mut model = WasmLinearModel::new(vec![1.0, -2.0, -1.0, 1.0], 1).expect("model");
        model
            .set_constant_forcing(vec![0.5, 0.0])
            .expect("constant forcing");
        model
            .add_decaying_shock(vec![0.0, 1.0], 0.5)
            .expect("decaying shock");
        assert!(matches!(model.model.forcing, Forcing::Decaying { .. }));

        model
            .set_sampled_forcing(vec![0.0, 2.0], vec![1.0, 0.0, 0.0, 0.0])
            .expect("sampled forcing");
        assert!(matches!(model.model.forcing, Forcing::Sampled { .. }));

        model.clear_forcing();
        assert_eq!(model.model.forcing, Forcing::Zero);
    }

    #[test]
    fn tolerances_are_applied() {
        let mut model = WasmLinearModel::new(vec![1.0, -2.0, -1.0, 1.0], 1).expect("model");
        model.set_tolerances(1e-9, 1e-7, 1e8).expect("tolerances");
        assert_eq!(model.settings.stability_tolerance, 1e-9);
        assert_eq!(model.settings.imaginary_tolerance, 1e-7);
        assert_eq!(model.settings.max_condition, 1e8);
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn wasm_model_rejects_non_square_matrix() {
        let result = WasmLinearModel::new(vec![1.0, 2.0, 3.0], 1);
        assert!(result.is_err(), "expected construction error");
    }
}
