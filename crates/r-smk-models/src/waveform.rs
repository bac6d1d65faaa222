//! ---
//! smk_section: "08-simulation-models"
//! smk_subsection: "module"
//! smk_type: "source"
//! smk_scope: "code"
//! smk_description: "Noisy sine waveform reference model."
//! smk_version: "v0.1.0"
//! smk_owner: "tbd"
//! ---
use std::f64::consts::PI;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use r_smk_kernel::{
    require_model_state, EntryPoint, Field, FieldFlags, Logger, Model, ModelState, Publication,
    Result, ScalarField, SimulationContext,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Shape of the generated waveform.
#[derive(Debug, Clone, Copy)]
pub struct WaveformParams {
    /// Interval between samples.
    pub sample_period: Duration,
    /// Sine frequency in hertz of simulation time.
    pub frequency_hz: f64,
    /// Peak amplitude.
    pub amplitude: f64,
    /// Standard deviation of the additive Gaussian noise.
    pub noise_sigma: f64,
    /// Seed for the deterministic noise source.
    pub seed: u64,
}

impl Default for WaveformParams {
    fn default() -> Self {
        Self {
            sample_period: Duration::milliseconds(100),
            frequency_hz: 0.2,
            amplitude: 5.0,
            noise_sigma: 0.05,
            seed: 42,
        }
    }
}

/// Samples a sine wave with Gaussian noise on a cyclic simulation-time
/// event, publishing the latest sample as `value`.
pub struct WaveformModel {
    name: String,
    state: ModelState,
    params: WaveformParams,
    value: Arc<ScalarField<f64>>,
    rng: Arc<Mutex<StdRng>>,
    noise: Normal<f64>,
}

impl WaveformModel {
    /// A waveform generator named `name`.
    pub fn new(name: impl Into<String>, params: WaveformParams) -> Self {
        Self {
            name: name.into(),
            state: ModelState::Created,
            params,
            value: ScalarField::new(0.0),
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(params.seed))),
            noise: Normal::new(0.0, params.noise_sigma).expect("noise sigma must be non-negative"),
        }
    }

    /// Latest sample.
    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

impl Model for WaveformModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "noisy sine waveform"
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn publish(&mut self, publication: &mut dyn Publication) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Created)?;
        publication.publish_field(Field::new(
            &self.name,
            "value",
            "latest waveform sample",
            FieldFlags {
                state: false,
                input: false,
                output: true,
            },
            self.value.clone(),
        ))?;
        self.state = ModelState::Publishing;
        Ok(())
    }

    fn configure(&mut self, _logger: Arc<dyn Logger>) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Publishing)?;
        self.state = ModelState::Configured;
        Ok(())
    }

    fn connect(&mut self, context: &SimulationContext) -> Result<()> {
        require_model_state(&self.name, self.state, ModelState::Configured)?;
        let value = self.value.clone();
        let rng = Arc::clone(&self.rng);
        let noise = self.noise;
        let clock = Arc::clone(context.time_keeper());
        let WaveformParams {
            frequency_hz,
            amplitude,
            ..
        } = self.params;
        let sample = EntryPoint::new(&self.name, "sample", move || {
            let t = clock.simulation_time().num_milliseconds() as f64 / 1000.0;
            let wave = amplitude * (2.0 * PI * frequency_hz * t).sin();
            value.set(wave + noise.sample(&mut *rng.lock()));
        });
        context.scheduler().add_simulation_time_event(
            sample,
            self.params.sample_period,
            self.params.sample_period,
            -1,
        )?;
        self.state = ModelState::Connected;
        Ok(())
    }
}
