use std::fs;

use approx::assert_relative_eq;
use tempfile::tempdir;

use tempo_power::{PathSampler, PowerSamples, SteppingStoneSampler};

#[test]
fn summary_rows_are_grouped_by_power() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("powp.out");
    fs::write(
        &path,
        "state\tpower\tlikelihood\n\
         10\t0\t-40\n20\t0\t-42\n\
         10\t1\t-10\n20\t1\t-12\n\
         10\t0.5\t-20\n20\t0.5\t-22\n",
    )
    .unwrap();
    let samples = PowerSamples::read(&path).unwrap();
    assert_eq!(samples.powers(), &[1.0, 0.5, 0.0]);
    assert_eq!(samples.samples()[2], vec![-40.0, -42.0]);

    let path_sampler = PathSampler::new(samples.clone());
    assert_eq!(path_sampler.path_values(), vec![-11.0, -21.0, -41.0]);
    assert_relative_eq!(
        path_sampler.marginal_likelihood(),
        0.25 * (-11.0 - 21.0) + 0.25 * (-21.0 - 41.0),
        epsilon = 1e-12
    );
    // cached
    assert_eq!(
        path_sampler.marginal_likelihood(),
        path_sampler.marginal_likelihood()
    );

    let expected: f64 = [(0.5, [-20.0, -22.0]), (0.5, [-40.0, -42.0])]
        .iter()
        .map(|(step, values)| {
            let mean = values.iter().map(|v: &f64| (step * v).exp()).sum::<f64>() / 2.0;
            mean.ln()
        })
        .sum();
    assert_relative_eq!(
        SteppingStoneSampler::new(samples).marginal_likelihood(),
        expected,
        epsilon = 1e-12
    );
}

#[test]
fn constant_samples_give_the_constant_back() {
    let powers = vec![1.0, 0.9, 0.4, 0.1, 0.0];
    let samples = PowerSamples::new(powers, vec![vec![-7.25; 3]; 5]).unwrap();
    assert_relative_eq!(
        PathSampler::new(samples.clone()).marginal_likelihood(),
        -7.25,
        epsilon = 1e-12
    );
    assert_relative_eq!(
        SteppingStoneSampler::new(samples).marginal_likelihood(),
        -7.25,
        epsilon = 1e-12
    );
}

#[test]
fn malformed_rows_report_their_line() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.out");
    fs::write(&path, "state\tpower\tlikelihood\n10\t1\t-3\n20\tone\t-4\n").unwrap();
    let err = PowerSamples::read(&path).unwrap_err();
    assert_eq!(err.info().code, "samples-parse");
    assert_eq!(err.info().context.get("line").map(String::as_str), Some("3"));
}

#[test]
fn header_only_file_has_no_samples() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.out");
    fs::write(&path, "state\tpower\tlikelihood\n").unwrap();
    assert_eq!(
        PowerSamples::read(&path).unwrap_err().info().code,
        "empty-samples"
    );
}

#[test]
fn powers_must_decrease() {
    let err = PowerSamples::new(vec![0.0, 1.0], vec![vec![-1.0], vec![-2.0]]).unwrap_err();
    assert_eq!(err.info().code, "unsorted-powers");
}
