use fixed_rnn_inference::FixedPointError;
use fixed_rnn_inference::fixed_point::{self, FixedPoint, Precision};

/// Largest deviation from one allowed for `exp(x) * exp(-x)`.
const EXP_RECIPROCAL_DELTA: i16 = 3;

fn p(bits: u8) -> Precision {
    Precision::new(bits).unwrap()
}

/// Representable inputs excluding `i16::MIN`, whose negation wraps.
fn symmetric_range() -> impl Iterator<Item = FixedPoint> {
    (-i16::MAX..=i16::MAX).step_by(7)
}

#[test]
fn test_multiplication_scenarios() {
    assert_eq!(fixed_point::mul(8, 8, p(3)), 8);
    assert_eq!(fixed_point::mul(8, 16, p(3)), 16);
    assert_eq!(fixed_point::mul(16, 16, p(3)), 32);
}

#[test]
fn test_division_scenarios() {
    assert_eq!(fixed_point::div(8, 16, p(3)), Ok(4));
    assert_eq!(fixed_point::div(16, 8, p(3)), Ok(32));
    assert_eq!(fixed_point::div(32, 16, p(3)), Ok(16));
}

#[test]
fn test_exp_scenarios() {
    assert_eq!(fixed_point::exp(32, p(5)), Ok(86));
    assert_eq!(fixed_point::exp(64, p(5)), Ok(233));
    assert_eq!(fixed_point::exp(-256, p(8)), Ok(95));
    assert_eq!(fixed_point::exp(-512, p(8)), Ok(43));
}

#[test]
fn test_tanh_scenarios() {
    assert_eq!(fixed_point::tanh(0, p(5)), Ok(0));
    assert_eq!(fixed_point::tanh(32, p(5)), Ok(24));
    assert_eq!(fixed_point::tanh(-32, p(5)), Ok(-24));
    assert_eq!(fixed_point::tanh(64, p(5)), Ok(32));
    assert_eq!(fixed_point::tanh(-64, p(5)), Ok(-32));
}

#[test]
fn test_sigmoid_scenarios() {
    assert_eq!(fixed_point::sigmoid(0, p(8)), Ok(128));
    assert_eq!(fixed_point::sigmoid(256, p(8)), Ok(186));
    assert_eq!(fixed_point::sigmoid(-256, p(8)), Ok(70));
    assert_eq!(fixed_point::sigmoid(512, p(8)), Ok(224));
    assert_eq!(fixed_point::sigmoid(-512, p(8)), Ok(32));
}

#[test]
fn test_identity_laws() {
    for bits in [3, 5, 8, 10] {
        let precision = p(bits);
        let one = precision.one();
        assert_eq!(fixed_point::mul(one, one, precision), one);
        assert_eq!(fixed_point::div(one, one, precision), Ok(one));
        assert_eq!(
            fixed_point::neg(fixed_point::mul(one, one, precision)),
            fixed_point::mul(fixed_point::neg(one), one, precision)
        );
    }
}

#[test]
fn test_scaling_laws() {
    for bits in [3, 5, 8, 10] {
        let precision = p(bits);
        let one = fixed_point::from_int(1, precision);
        let two = fixed_point::from_int(2, precision);
        let four = fixed_point::from_int(4, precision);
        assert_eq!(fixed_point::mul(one, two, precision), two);
        assert_eq!(fixed_point::div(two, one, precision), Ok(two));
        assert_eq!(fixed_point::div(four, two, precision), Ok(two));
    }
}

#[test]
fn test_division_inverts_multiplication() {
    let precision = p(8);
    for x in (-600..600).step_by(7) {
        for y in [128, 256, 300, 512, -256, -384] {
            let product = fixed_point::mul(x, y, precision);
            let recovered = fixed_point::div(product, y, precision).unwrap();
            assert!(
                (recovered - x).abs() <= 1,
                "div(mul({x}, {y}), {y}) = {recovered}"
            );
        }
    }
}

#[test]
fn test_exp_reciprocal_identity() {
    for (bits, max) in [(5u8, 32i16), (8, 256)] {
        let precision = p(bits);
        for x in 0..=max {
            let forward = fixed_point::exp(x, precision).unwrap();
            let backward = fixed_point::exp(-x, precision).unwrap();
            let product = fixed_point::mul(forward, backward, precision);
            assert!(
                (product - precision.one()).abs() <= EXP_RECIPROCAL_DELTA,
                "exp({x}) * exp(-{x}) = {product} at {precision}"
            );
        }
    }
}

#[test]
fn test_tanh_bounds_and_symmetry() {
    for bits in [3, 5, 8, 13] {
        let precision = p(bits);
        let one = precision.one();
        assert_eq!(fixed_point::tanh(0, precision), Ok(0));
        for x in symmetric_range() {
            let positive = fixed_point::tanh(x, precision).unwrap();
            let negative = fixed_point::tanh(-x, precision).unwrap();
            assert!((-one..=one).contains(&positive), "tanh({x}) = {positive}");
            assert_eq!(negative, -positive);
        }
    }
}

#[test]
fn test_sigmoid_bounds_and_symmetry() {
    for bits in [3, 5, 8, 13] {
        let precision = p(bits);
        let one = precision.one();
        assert_eq!(fixed_point::sigmoid(0, precision), Ok(one / 2));
        for x in symmetric_range() {
            let positive = fixed_point::sigmoid(x, precision).unwrap();
            let negative = fixed_point::sigmoid(-x, precision).unwrap();
            assert!((0..=one).contains(&positive), "sigmoid({x}) = {positive}");
            assert_eq!(negative, one - positive);
        }
    }
}

#[test]
fn test_convert_between_formats() {
    let value = fixed_point::from_float(1.5, p(3));
    assert_eq!(value, 12);
    assert_eq!(fixed_point::convert(value, p(3), p(8)), 384);
    assert_eq!(fixed_point::convert(384, p(8), p(3)), 12);
    assert_eq!(fixed_point::to_float(384, p(8)), 1.5);
}

#[test]
fn test_division_by_zero_is_reported() {
    assert!(matches!(
        fixed_point::div(5, 0, p(8)),
        Err(FixedPointError::DivisionByZero { numerator: 5 })
    ));
}

#[test]
fn test_checked_arithmetic_reports_overflow() {
    assert!(matches!(
        fixed_point::checked_mul(i16::MAX, 512, p(8)),
        Err(FixedPointError::Overflow { value: 65534 })
    ));
    assert!(matches!(
        fixed_point::checked_add(i16::MAX, 1),
        Err(FixedPointError::Overflow { value: 32768 })
    ));
    assert_eq!(fixed_point::checked_sub(-5, 3), Ok(-8));
    assert_eq!(fixed_point::checked_div(256, 512, p(8)), Ok(128));
}

#[test]
fn test_most_negative_input_saturates() {
    for bits in [3, 5, 8, 13] {
        let precision = p(bits);
        let one = precision.one();
        assert_eq!(fixed_point::tanh(i16::MIN, precision), Ok(-one));
        assert_eq!(fixed_point::sigmoid(i16::MIN, precision), Ok(0));

        let lowest = fixed_point::sigmoid(i16::MIN, precision).unwrap();
        let next = fixed_point::sigmoid(i16::MIN + 1, precision).unwrap();
        assert!(lowest <= next, "sigmoid(i16::MIN) = {lowest} > {next}");
    }
}
