use fixed_rnn_inference::layers::{
    self, CellParameters, FusedGruParameters, GateWeights, GruParameters, RecurrentCell,
};
use fixed_rnn_inference::matrix;
use fixed_rnn_inference::{Activation, InferenceError, Matrix, Precision};

const STATE_SIZE: usize = 2;
const INPUT_SIZE: usize = 3;

fn q8() -> Precision {
    Precision::new(8).unwrap()
}

fn column(values: &[i16]) -> Matrix {
    Matrix::from_data(values.len(), 1, values.to_vec()).unwrap()
}

/// Deterministic values in `[-200, 200]`.
fn pseudo_random(rows: usize, cols: usize, seed: i32) -> Matrix {
    let data = (0..(rows * cols) as i32)
        .map(|i| (((i + 1) * 97 + seed * 31) % 401 - 200) as i16)
        .collect();
    Matrix::from_data(rows, cols, data).unwrap()
}

/// Places `left` and `right` side by side.
fn hstack(left: &Matrix, right: &Matrix) -> Matrix {
    let mut data = Vec::new();
    for row in 0..left.num_rows() {
        for col in 0..left.num_cols() {
            data.push(left.get(row, col).unwrap());
        }
        for col in 0..right.num_cols() {
            data.push(right.get(row, col).unwrap());
        }
    }
    Matrix::from_data(left.num_rows(), left.num_cols() + right.num_cols(), data).unwrap()
}

fn vstack(top: &Matrix, bottom: &Matrix) -> Matrix {
    let mut dest = Matrix::allocate(top.num_rows() + bottom.num_rows(), top.num_cols()).unwrap();
    matrix::stack(&mut dest, top, bottom).unwrap();
    dest
}

fn gate(seed: i32) -> GateWeights {
    GateWeights::new(
        pseudo_random(STATE_SIZE, STATE_SIZE, seed),
        pseudo_random(STATE_SIZE, INPUT_SIZE, seed + 1),
        pseudo_random(STATE_SIZE, 1, seed + 2),
    )
}

fn gru() -> GruParameters {
    GruParameters::new(gate(1), gate(10), gate(20)).unwrap()
}

/// The fused parameters computing exactly what [`gru`] computes.
fn equivalent_fused_gru(gru: &GruParameters) -> FusedGruParameters {
    let (update, reset, candidate) = (gru.update(), gru.reset(), gru.candidate());
    FusedGruParameters::new(
        vstack(&hstack(&reset.u, &reset.w), &hstack(&update.u, &update.w)),
        vstack(&reset.b, &update.b),
        hstack(&candidate.u, &candidate.w),
        candidate.b.clone(),
    )
    .unwrap()
}

fn inputs(steps: usize) -> Vec<Matrix> {
    (0..steps)
        .map(|step| pseudo_random(INPUT_SIZE, 1, 100 + step as i32))
        .collect()
}

fn scalar(value: i16) -> Matrix {
    column(&[value])
}

#[test]
fn test_dense_scenario() {
    let precision = Precision::new(3).unwrap();
    let weights = Matrix::from_data(2, 2, vec![8, 16, -8, 4]).unwrap();
    let bias = column(&[0, 8]);
    let input = column(&[8, 8]);
    let mut dest = Matrix::column(2).unwrap();

    layers::dense(
        &mut dest,
        &input,
        &weights,
        Some(&bias),
        Activation::Linear,
        precision,
    )
    .unwrap();
    assert_eq!(dest.as_slice(), &[24, 4]);

    layers::dense(
        &mut dest,
        &input,
        &weights,
        Some(&bias),
        Activation::Tanh,
        precision,
    )
    .unwrap();
    assert_eq!(dest.as_slice(), &[8, 3]);
}

#[test]
fn test_gate_blend_edges() {
    let first = pseudo_random(4, 1, 3);
    let second = pseudo_random(4, 1, 4);
    let mut dest = Matrix::column(4).unwrap();

    let mut ones = Matrix::column(4).unwrap();
    ones.set(q8().one());
    layers::gate_blend(&mut dest, &ones, &first, &second, q8()).unwrap();
    assert_eq!(dest, first);

    let zeros = Matrix::column(4).unwrap();
    layers::gate_blend(&mut dest, &zeros, &first, &second, q8()).unwrap();
    assert_eq!(dest, second);
}

#[test]
fn test_gru_sequence_converges_toward_candidate() {
    let cell: CellParameters = GruParameters::new(
        GateWeights::new(scalar(0), scalar(0), scalar(0)),
        GateWeights::new(scalar(0), scalar(0), scalar(0)),
        GateWeights::new(scalar(0), scalar(0), scalar(256)),
    )
    .unwrap()
    .into();
    let sequence = vec![scalar(5); 3];

    let mut expected_states = Vec::new();
    for steps in 1..=3 {
        let mut dest = Matrix::column(1).unwrap();
        layers::rnn(&mut dest, &sequence, &cell, steps, q8()).unwrap();
        expected_states.push(dest.as_slice()[0]);
    }
    assert_eq!(expected_states, vec![96, 144, 168]);
}

#[test]
fn test_fused_cell_matches_gru_cell() {
    let gru = gru();
    let fused = equivalent_fused_gru(&gru);
    assert_eq!(fused.state_size(), STATE_SIZE);
    assert_eq!(fused.input_size(), INPUT_SIZE);

    let input = pseudo_random(INPUT_SIZE, 1, 7);
    let state = pseudo_random(STATE_SIZE, 1, 8);
    let mut from_gru = Matrix::column(STATE_SIZE).unwrap();
    let mut from_fused = Matrix::column(STATE_SIZE).unwrap();
    layers::gru_cell(&mut from_gru, &input, &state, &gru, q8()).unwrap();
    layers::fused_gru_cell(&mut from_fused, &input, &state, &fused, q8()).unwrap();
    assert_eq!(from_gru, from_fused);
}

#[test]
fn test_fused_rnn_matches_gru_rnn() {
    let gru = gru();
    let fused: CellParameters = equivalent_fused_gru(&gru).into();
    let gru: CellParameters = gru.into();
    let sequence = inputs(6);

    let mut from_gru = Matrix::column(STATE_SIZE).unwrap();
    let mut from_fused = Matrix::column(STATE_SIZE).unwrap();
    layers::rnn(&mut from_gru, &sequence, &gru, 6, q8()).unwrap();
    layers::rnn(&mut from_fused, &sequence, &fused, 6, q8()).unwrap();
    assert_eq!(from_gru, from_fused);
}

#[test]
fn test_rnn_matches_manual_cell_loop() {
    let gru = gru();
    let sequence = inputs(4);

    let mut state = Matrix::column(STATE_SIZE).unwrap();
    let mut next = Matrix::column(STATE_SIZE).unwrap();
    for input in &sequence {
        layers::gru_cell(&mut next, input, &state, &gru, q8()).unwrap();
        matrix::replace(&mut state, &next).unwrap();
    }

    let mut workspace = gru.workspace().unwrap();
    let mut dest = Matrix::column(STATE_SIZE).unwrap();
    layers::rnn_with_workspace(&mut dest, &sequence, &gru, &mut workspace, 4, q8()).unwrap();
    assert_eq!(dest, state);
}

#[test]
fn test_workspace_reuse_is_deterministic() {
    let gru = gru();
    let input = pseudo_random(INPUT_SIZE, 1, 9);
    let state = pseudo_random(STATE_SIZE, 1, 11);
    let mut workspace = gru.workspace().unwrap();

    let mut first = Matrix::column(STATE_SIZE).unwrap();
    let mut second = Matrix::column(STATE_SIZE).unwrap();
    layers::gru_cell_with_workspace(&mut first, &input, &state, &gru, &mut workspace, q8()).unwrap();
    layers::gru_cell_with_workspace(&mut second, &input, &state, &gru, &mut workspace, q8())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_output_shape_equals_state_shape() {
    let gru = gru();
    let fused = equivalent_fused_gru(&gru);
    let cell: CellParameters = gru.clone().into();
    for seq_length in [0, 1, 5] {
        let mut dest = Matrix::column(STATE_SIZE).unwrap();
        layers::rnn(&mut dest, &inputs(5), &cell, seq_length, q8()).unwrap();
        assert_eq!(dest.shape(), (STATE_SIZE, 1));
    }

    let input = pseudo_random(INPUT_SIZE, 1, 2);
    let state = pseudo_random(STATE_SIZE, 1, 3);
    let mut dest = Matrix::column(STATE_SIZE).unwrap();
    layers::fused_gru_cell(&mut dest, &input, &state, &fused, q8()).unwrap();
    assert_eq!(dest.shape(), state.shape());
}

#[test]
fn test_rnn_rejects_wrong_state_shape() {
    let cell: CellParameters = gru().into();
    let mut dest = Matrix::column(STATE_SIZE + 1).unwrap();
    assert!(matches!(
        layers::rnn(&mut dest, &inputs(2), &cell, 2, q8()),
        Err(InferenceError::ShapeMismatch {
            operation: "rnn",
            expected: (STATE_SIZE, 1),
            actual: (3, 1)
        })
    ));
}
