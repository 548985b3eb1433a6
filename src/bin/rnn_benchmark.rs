//! Timing harness for fixed-point sequence inference.
//!
//! Builds a standard or adaptive model with deterministic synthetic weights in the
//! shape described by a configuration file, checks that the allocating and the
//! workspace-reusing paths agree, and reports the average time per sequence for
//! both.
//!
//! Usage: `rnn_benchmark [config.json]` (defaults to `configs/default.json`).

use std::process;
use std::time::Instant;

use fixed_rnn_inference::errors::InferenceResult;
use fixed_rnn_inference::fixed_point;
use fixed_rnn_inference::{
    Activation, AdaptiveModel, AdaptiveWorkspace, CellParameters, CellType, DenseLayer,
    FusedGruParameters, GateWeights, GruParameters, InferenceConfig, Matrix, ModelClass,
    ModelWorkspace, Precision, Prediction, SequenceModel,
};
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_CONFIG_PATH: &str = "configs/default.json";
const WARMUP_ITERATIONS: usize = 10;
const WEIGHT_SEED: u64 = 0x5eed;
const INPUT_SEED: u64 = 0x1234;
/// Confidence every adaptive level needs before it stops the computation.
const LEVEL_THRESHOLD: f32 = 0.9;

/// Seeded source of synthetic weights, so every run benchmarks the same model.
struct WeightGenerator {
    rng: StdRng,
}

impl WeightGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Matrix of values drawn uniformly from `[-0.5, 0.5)`.
    fn matrix(&mut self, rows: usize, cols: usize, precision: Precision) -> InferenceResult<Matrix> {
        let values: Vec<f32> = (0..rows * cols)
            .map(|_| self.rng.gen_range(-0.5..0.5))
            .collect();
        Matrix::from_floats(rows, cols, &values, precision)
    }
}

/// The two model classes behind one benchmarking interface.
trait Predictor {
    type Workspace;

    fn precision(&self) -> Precision;
    fn workspace(&self) -> InferenceResult<Self::Workspace>;
    fn predict(&self, inputs: &[Matrix]) -> InferenceResult<Prediction>;
    fn predict_with_workspace(
        &self,
        inputs: &[Matrix],
        workspace: &mut Self::Workspace,
    ) -> InferenceResult<Prediction>;
}

impl Predictor for SequenceModel {
    type Workspace = ModelWorkspace;

    fn precision(&self) -> Precision {
        SequenceModel::precision(self)
    }

    fn workspace(&self) -> InferenceResult<ModelWorkspace> {
        SequenceModel::workspace(self)
    }

    fn predict(&self, inputs: &[Matrix]) -> InferenceResult<Prediction> {
        SequenceModel::predict(self, inputs)
    }

    fn predict_with_workspace(
        &self,
        inputs: &[Matrix],
        workspace: &mut ModelWorkspace,
    ) -> InferenceResult<Prediction> {
        SequenceModel::predict_with_workspace(self, inputs, workspace)
    }
}

impl Predictor for AdaptiveModel {
    type Workspace = AdaptiveWorkspace;

    fn precision(&self) -> Precision {
        AdaptiveModel::precision(self)
    }

    fn workspace(&self) -> InferenceResult<AdaptiveWorkspace> {
        AdaptiveModel::workspace(self)
    }

    fn predict(&self, inputs: &[Matrix]) -> InferenceResult<Prediction> {
        AdaptiveModel::predict(self, inputs)
    }

    fn predict_with_workspace(
        &self,
        inputs: &[Matrix],
        workspace: &mut AdaptiveWorkspace,
    ) -> InferenceResult<Prediction> {
        AdaptiveModel::predict_with_workspace(self, inputs, workspace)
    }
}

struct PerformanceResults {
    method: String,
    total_time_ns: u128,
    average_time_us: f64,
}

impl PerformanceResults {
    fn new(method: &str, total_time_ns: u128, num_executions: usize) -> Self {
        Self {
            method: method.to_string(),
            total_time_ns,
            average_time_us: total_time_ns as f64 / num_executions as f64 / 1_000.0,
        }
    }
}

struct Layers {
    embedding: Vec<DenseLayer>,
    cell: CellParameters,
    output: Vec<DenseLayer>,
}

fn build_layers(config: &InferenceConfig, generator: &mut WeightGenerator) -> InferenceResult<Layers> {
    let precision = Precision::new(config.precision)?;
    let (input, embedded, state) = (config.input_size, config.embedding_size, config.state_size);

    let embedding = vec![DenseLayer::new(
        generator.matrix(embedded, input, precision)?,
        Some(generator.matrix(embedded, 1, precision)?),
        Activation::Tanh,
    )?];

    let cell: CellParameters = match config.cell_type {
        CellType::Gru => {
            let mut gate = || -> InferenceResult<GateWeights> {
                Ok(GateWeights::new(
                    generator.matrix(state, state, precision)?,
                    generator.matrix(state, embedded, precision)?,
                    generator.matrix(state, 1, precision)?,
                ))
            };
            GruParameters::new(gate()?, gate()?, gate()?)?.into()
        }
        CellType::TfGru => FusedGruParameters::new(
            generator.matrix(2 * state, embedded + state, precision)?,
            generator.matrix(2 * state, 1, precision)?,
            generator.matrix(state, embedded + state, precision)?,
            generator.matrix(state, 1, precision)?,
        )?
        .into(),
    };

    let mut output = Vec::new();
    let mut previous = state;
    for &units in config
        .output_hidden_units
        .iter()
        .chain(std::iter::once(&config.output_size))
    {
        output.push(DenseLayer::new(
            generator.matrix(units, previous, precision)?,
            Some(generator.matrix(units, 1, precision)?),
            Activation::Sigmoid,
        )?);
        previous = units;
    }

    Ok(Layers {
        embedding,
        cell,
        output,
    })
}

fn build_standard_model(config: &InferenceConfig) -> InferenceResult<SequenceModel> {
    let mut generator = WeightGenerator::new(WEIGHT_SEED);
    let layers = build_layers(config, &mut generator)?;
    SequenceModel::from_config(config, layers.embedding, layers.cell, layers.output)
}

fn build_adaptive_model(config: &InferenceConfig) -> InferenceResult<AdaptiveModel> {
    let precision = Precision::new(config.precision)?;
    let mut generator = WeightGenerator::new(WEIGHT_SEED);
    let layers = build_layers(config, &mut generator)?;
    let state = config.state_size;
    let fusion = DenseLayer::new(
        generator.matrix(state, 2 * state, precision)?,
        Some(generator.matrix(state, 1, precision)?),
        Activation::Sigmoid,
    )?;
    let threshold = fixed_point::from_float(LEVEL_THRESHOLD, precision);
    AdaptiveModel::from_config(
        config,
        layers.embedding,
        layers.cell,
        fusion,
        layers.output,
        vec![threshold; config.num_levels],
    )
}

fn build_inputs(config: &InferenceConfig) -> InferenceResult<Vec<Matrix>> {
    let precision = Precision::new(config.precision)?;
    let mut generator = WeightGenerator::new(INPUT_SEED);
    (0..config.seq_length)
        .map(|_| generator.matrix(config.input_size, 1, precision))
        .collect()
}

fn benchmark_method<F>(
    name: &str,
    num_executions: usize,
    mut benchmark_fn: F,
) -> InferenceResult<PerformanceResults>
where
    F: FnMut() -> InferenceResult<()>,
{
    info!("Benchmarking {} ({} executions)...", name, num_executions);

    for _ in 0..WARMUP_ITERATIONS {
        benchmark_fn()?;
    }

    let start = Instant::now();
    for _ in 0..num_executions {
        benchmark_fn()?;
    }
    let duration = start.elapsed();

    Ok(PerformanceResults::new(
        name,
        duration.as_nanos(),
        num_executions,
    ))
}

fn run(config: &InferenceConfig) -> InferenceResult<()> {
    info!("{}", "=".repeat(80));
    info!("Fixed-point Sequence Inference Benchmark");
    info!(
        "Model: {} inputs -> {} embedded -> {} {} states -> {:?} hidden -> {} outputs ({:?})",
        config.input_size,
        config.embedding_size,
        config.state_size,
        config.cell_type.name(),
        config.output_hidden_units,
        config.output_size,
        config.output_type
    );
    info!(
        "Class: {}, levels: {}, sequence length: {}, precision: Q{}",
        config.model_class.name(),
        config.num_levels,
        config.seq_length,
        config.precision
    );
    info!("{}", "=".repeat(80));

    let inputs = build_inputs(config)?;
    match config.model_class {
        ModelClass::Standard => benchmark_model(&build_standard_model(config)?, &inputs, config),
        ModelClass::Adaptive => benchmark_model(&build_adaptive_model(config)?, &inputs, config),
    }
}

fn benchmark_model<P: Predictor>(
    model: &P,
    inputs: &[Matrix],
    config: &InferenceConfig,
) -> InferenceResult<()> {
    info!("Verifying that both execution paths agree...");
    let allocating = model.predict(inputs)?;
    let mut workspace = model.workspace()?;
    let reusing = model.predict_with_workspace(inputs, &mut workspace)?;
    if allocating != reusing {
        error!(
            "Predictions differ: {:?} vs {:?}",
            allocating.value, reusing.value
        );
        process::exit(1);
    }
    info!(
        "Prediction: {:?} after {} level(s), outputs: {:?}",
        allocating.value,
        allocating.num_levels,
        allocating.outputs.to_floats(model.precision())
    );

    let results = [
        benchmark_method("Allocating workspace per call", config.num_executions, || {
            model.predict(inputs).map(|_| ())
        })?,
        benchmark_method("Reused workspace", config.num_executions, || {
            model
                .predict_with_workspace(inputs, &mut workspace)
                .map(|_| ())
        })?,
    ];

    info!("{}", "=".repeat(80));
    for result in &results {
        info!(
            "{}: {:.3} us per sequence ({:.3} us per step, {} ns total)",
            result.method,
            result.average_time_us,
            result.average_time_us / config.seq_length as f64,
            result.total_time_ns
        );
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match InferenceConfig::load_or_default(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        error!("Benchmark failed: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_are_reproducible_and_bounded() {
        let precision = Precision::new(8).unwrap();
        let first = WeightGenerator::new(WEIGHT_SEED).matrix(4, 3, precision).unwrap();
        let second = WeightGenerator::new(WEIGHT_SEED).matrix(4, 3, precision).unwrap();
        assert_eq!(first, second);
        assert!(first.as_slice().iter().all(|&value| (-128..128).contains(&value)));
    }

    #[test]
    fn test_both_model_classes_build_from_shipped_configs() {
        let standard = InferenceConfig::load("configs/default.json").unwrap();
        let inputs = build_inputs(&standard).unwrap();
        let prediction = build_standard_model(&standard).unwrap().predict(&inputs).unwrap();
        assert_eq!(prediction.num_levels, 1);

        let adaptive = InferenceConfig::load("configs/adaptive.json").unwrap();
        let inputs = build_inputs(&adaptive).unwrap();
        let prediction = build_adaptive_model(&adaptive).unwrap().predict(&inputs).unwrap();
        assert!((1..=adaptive.num_levels).contains(&prediction.num_levels));
    }
}
