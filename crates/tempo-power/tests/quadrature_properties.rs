use approx::assert_relative_eq;
use proptest::prelude::*;

use tempo_power::{simpsons_rule, trapezoid_rule};

fn descending_triple() -> impl Strategy<Value = (f64, f64, f64)> {
    (0.0f64..0.3, 0.05f64..0.4, 0.05f64..0.4).prop_map(|(b, gap_low, gap_high)| {
        let c = b + gap_low;
        let a = c + gap_high;
        (a, c, b)
    })
}

proptest! {
    #[test]
    fn simpson_matches_trapezoid_on_lines(
        (a, c, b) in descending_triple(),
        slope in -50.0f64..50.0,
        intercept in -200.0f64..0.0,
    ) {
        let f = |x: f64| slope * x + intercept;
        let trapezoid = trapezoid_rule(f(a), f(c), a, c) + trapezoid_rule(f(c), f(b), c, b);
        let simpson = simpsons_rule(f(a), f(b), f(c), a, b, c);
        prop_assert!((trapezoid - simpson).abs() < 1e-9 * (1.0 + trapezoid.abs()));
    }

    #[test]
    fn simpson_is_exact_on_parabolas(
        (a, c, b) in descending_triple(),
        q in -20.0f64..20.0,
        slope in -50.0f64..50.0,
        intercept in -200.0f64..0.0,
    ) {
        let f = |x: f64| q * x * x + slope * x + intercept;
        let antiderivative = |x: f64| q * x.powi(3) / 3.0 + slope * x * x / 2.0 + intercept * x;
        let exact = antiderivative(a) - antiderivative(b);
        let simpson = simpsons_rule(f(a), f(b), f(c), a, b, c);
        prop_assert!((exact - simpson).abs() < 1e-9 * (1.0 + exact.abs()));
    }
}

#[test]
fn uneven_segments_are_weighted_by_width() {
    // [1, 0.8] and [0.8, 0]
    let trapezoid = trapezoid_rule(-1.0, -2.0, 1.0, 0.8) + trapezoid_rule(-2.0, -6.0, 0.8, 0.0);
    assert_relative_eq!(trapezoid, 0.1 * -3.0 + 0.4 * -8.0, epsilon = 1e-12);
}
