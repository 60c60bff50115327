//! End-to-end scenarios on a real CUDA device.
//!
//! All tests are ignored by default; run them on a machine with a GPU via
//! `cargo test -p cardiogrid-sim -- --ignored`.

#![cfg(feature = "cuda")]

use cardiogrid_core::{CardioError, ModelDescriptor, Protocol, REAL_NAME};
use cardiogrid_sim::{Simulation, SimulationConfig, StepResult};

fn descriptor() -> ModelDescriptor {
    ModelDescriptor {
        n_state: 1,
        n_cache: 0,
        state_names: vec!["membrane.V".into()],
        time_binding: Some("engine.time".into()),
        pace_binding: Some("engine.pace".into()),
        time_step_binding: Some("engine.dt".into()),
        diffusion_binding: Some("membrane.i_diff".into()),
    }
}

fn config(nx: usize, ny: usize, tmax: f64, dt: f64) -> SimulationConfig {
    SimulationConfig {
        nx,
        ny,
        gx: 0.0,
        gy: 0.0,
        tmin: 0.0,
        tmax,
        default_dt: dt,
        nx_paced: 0,
        ny_paced: 0,
        log_interval: 0.0,
        ratio: 1,
    }
}

/// The shared diffusion and step kernels for single-state test models.
fn common_kernels() -> String {
    format!(
        r#"
typedef {real} Real;

extern "C" __global__ void calc_diff_current(
    int nx, int ny, Real gx, Real gy,
    const Real* state, Real* idiff)
{{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= nx || y >= ny) return;
    int c = y * nx + x;
    Real v = state[c];
    Real vw = (x > 0)      ? state[c - 1]  : v;
    Real ve = (x < nx - 1) ? state[c + 1]  : v;
    Real vn = (y > 0)      ? state[c - nx] : v;
    Real vs = (y < ny - 1) ? state[c + nx] : v;
    idiff[c] = gx * (2 * v - vw - ve) + gy * (2 * v - vn - vs);
}}

extern "C" __global__ void perform_step(
    int nx, int ny, Real dt, Real* state, const Real* deriv)
{{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= nx || y >= ny) return;
    int c = y * nx + x;
    state[c] += dt * deriv[c];
}}
"#,
        real = REAL_NAME
    )
}

/// A derivative kernel pair computing `deriv = <expr>` for one state.
fn deriv_kernels(expr: &str) -> String {
    let mut source = String::new();
    for name in ["calc_slow_derivs", "calc_fast_derivs"] {
        source.push_str(&format!(
            r#"
extern "C" __global__ void {name}(
    int nx, int ny, Real time, Real dt, int nx_paced, int ny_paced,
    Real pace, const Real* state, const Real* idiff, Real* deriv, Real* cache)
{{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= nx || y >= ny) return;
    int c = y * nx + x;
    deriv[c] = {expr};
}}
"#
        ));
    }
    source
}

#[test]
#[ignore] // Requires CUDA hardware
fn test_linear_decay_on_device() {
    let program = common_kernels() + &deriv_kernels("-state[c]");
    let mut cfg = config(1, 1, 1.0, 1e-3);
    cfg.log_interval = 0.1;
    let mut sim = Simulation::new(descriptor(), cfg).unwrap();
    sim.init(
        &program,
        &[1.0],
        &Protocol::new(),
        &["0.membrane.V".to_string()],
    )
    .unwrap();

    let result = sim.run().unwrap();
    assert!(matches!(result, StepResult::Finished(t) if t >= 1.0));
    let v = sim.final_state().unwrap()[0];
    assert!((v - (-1.0f64).exp()).abs() < 1e-2, "v = {v}");
    assert_eq!(sim.log().rows(), 11);
}

#[test]
#[ignore] // Requires CUDA hardware
fn test_two_cell_diffusion_on_device() {
    let program = common_kernels() + &deriv_kernels("-idiff[c]");
    let mut cfg = config(2, 1, 10.0, 1e-3);
    cfg.gx = 1.0;
    let mut sim = Simulation::new(descriptor(), cfg).unwrap();
    sim.init(&program, &[-80.0, 0.0], &Protocol::new(), &[])
        .unwrap();
    sim.run().unwrap();

    let state = sim.final_state().unwrap();
    assert!((state[0] + 40.0).abs() < 1e-3, "v0 = {}", state[0]);
    assert!((state[1] + 40.0).abs() < 1e-3, "v1 = {}", state[1]);
}

#[test]
#[ignore] // Requires CUDA hardware
fn test_stimulated_corner_leads_on_device() {
    let program = common_kernels() + &deriv_kernels(
        "((x < nx_paced && y < ny_paced) ? pace : (Real)0) - idiff[c]",
    );
    let mut cfg = config(4, 4, 1.0, 1e-3);
    cfg.gx = 1.0;
    cfg.gy = 1.0;
    cfg.nx_paced = 1;
    cfg.ny_paced = 1;
    let mut protocol = Protocol::new();
    protocol.schedule(1.0, 0.0, 0.5, 100.0, 0).unwrap();
    let mut sim = Simulation::new(descriptor(), cfg).unwrap();
    sim.init(&program, &[0.0; 16], &protocol, &[]).unwrap();
    sim.run().unwrap();

    let state = sim.final_state().unwrap();
    for c in 1..16 {
        assert!(state[c] < state[0], "cell {c} should trail the paced cell");
    }
}

#[test]
#[ignore] // Requires CUDA hardware
fn test_build_failure_surfaces_log() {
    let mut sim = Simulation::new(descriptor(), config(1, 1, 1.0, 1e-3)).unwrap();
    let err = sim
        .init(
            "this is not a kernel program",
            &[1.0],
            &Protocol::new(),
            &[],
        )
        .unwrap_err();
    match err {
        CardioError::Compile { log } => assert!(!log.is_empty()),
        other => panic!("expected a compile error, got {other}"),
    }
    assert!(!sim.is_initialized());
}

#[test]
#[ignore] // Requires CUDA hardware
fn test_missing_kernel_rejected() {
    // A program that compiles but lacks the required entry points.
    let program = common_kernels();
    let mut sim = Simulation::new(descriptor(), config(1, 1, 1.0, 1e-3)).unwrap();
    let err = sim
        .init(&program, &[1.0], &Protocol::new(), &[])
        .unwrap_err();
    assert!(err.to_string().contains("calc_slow_derivs"));
    assert!(!sim.is_initialized());
}
