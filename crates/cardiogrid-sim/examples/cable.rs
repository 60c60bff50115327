//! Paced cable: a 50-cell fiber stimulated at one end.
//!
//! Runs on the host backend so it works without a GPU:
//!
//! ```bash
//! cargo run -p cardiogrid-sim --example cable
//! ```

use cardiogrid_core::{ModelDescriptor, Protocol, Real};
use cardiogrid_sim::{
    CellInputs, CellModel, HostBackend, Simulation, SimulationConfig, TissueGrid,
};

/// A minimal excitable cell: leak plus stimulus plus coupling.
struct LeakCell;

impl CellModel for LeakCell {
    fn n_state(&self) -> usize {
        1
    }
    fn n_cache(&self) -> usize {
        0
    }
    fn slow_derivs(&self, inputs: &CellInputs, state: &[Real], _: &mut [Real], deriv: &mut [Real]) {
        deriv[0] = 40.0 * inputs.pace - 0.5 * (state[0] + 80.0) - inputs.idiff;
    }
    fn fast_derivs(&self, inputs: &CellInputs, state: &[Real], _: &[Real], deriv: &mut [Real]) {
        deriv[0] = 40.0 * inputs.pace - 0.5 * (state[0] + 80.0) - inputs.idiff;
    }
}

fn main() -> cardiogrid_core::Result<()> {
    tracing_subscriber::fmt().init();

    let nx = 50;
    let config = SimulationConfig {
        nx,
        ny: 1,
        gx: 5.0,
        gy: 0.0,
        tmin: 0.0,
        tmax: 100.0,
        default_dt: 0.005,
        nx_paced: 3,
        ny_paced: 1,
        log_interval: 10.0,
        ratio: 1,
    };
    let descriptor = ModelDescriptor {
        n_state: 1,
        n_cache: 0,
        state_names: vec!["membrane.V".into()],
        time_binding: Some("engine.time".into()),
        pace_binding: Some("engine.pace".into()),
        time_step_binding: None,
        diffusion_binding: Some("membrane.i_diff".into()),
    };

    // 2 ms stimulus every 50 ms on the first three cells.
    let mut protocol = Protocol::new();
    protocol.schedule(1.0, 0.0, 2.0, 50.0, 0)?;

    let backend = HostBackend::new(
        TissueGrid::new(nx, 1)?,
        LeakCell,
        config.gx as Real,
        config.gy as Real,
        config.nx_paced,
        config.ny_paced,
    );

    let keys: Vec<String> = ["engine.time", "0.membrane.V", "25.membrane.V", "49.membrane.V"]
        .iter()
        .map(|k| k.to_string())
        .collect();

    let mut sim = Simulation::new(descriptor, config)?;
    sim.init_with_backend(
        Box::new(backend),
        &vec![-80.0; nx],
        &protocol,
        &keys,
    )?;
    sim.run()?;

    println!("time      V[0]      V[25]     V[49]");
    let log = sim.log();
    let times = log.series("engine.time").unwrap();
    for (row, &t) in times.iter().enumerate() {
        let v = |key: &str| log.series(key).unwrap()[row];
        println!(
            "{t:>6.1}  {:>8.3}  {:>8.3}  {:>8.3}",
            v("0.membrane.V"),
            v("25.membrane.V"),
            v("49.membrane.V")
        );
    }
    Ok(())
}
