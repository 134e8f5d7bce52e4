/// A continuous-time system `dz/dt = f(t, z)`.
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// z: current state
    /// out: buffer to write dz/dt into
    fn apply(&self, t: f64, z: &[f64], out: &mut [f64]);
}

/// A fixed-step integrator.
pub trait Steppable {
    /// Advances `state` from `t` to `t + dt` and updates `t`.
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64);
}
