use std::io::Cursor;

use eos_fit::app::pipeline::{run_fit, run_fit_on};
use eos_fit::data::{SyntheticSpec, generate_synthetic, reference_dataset};
use eos_fit::domain::{FitConfig, FitState, FitStrategy, ModelKind, ModelSpec, ParameterVector};
use eos_fit::fit::{
    LeastSquaresFitter, ParameterFitter, SurrogateConfig, SurrogateOptimizer, initial_guess, sse,
};
use eos_fit::io::{read_curve_json, read_samples, write_curve_json, write_samples_csv};

fn rel_err(a: f64, b: f64) -> f64 {
    (a - b).abs() / b.abs().max(1e-12)
}

#[test]
fn least_squares_recovers_synthetic_parameters() {
    let truth = ParameterVector::new(-10.0, 0.8, 4.5, 20.0);
    for model in ModelKind::ALL {
        let samples = generate_synthetic(&SyntheticSpec {
            model,
            params: truth,
            volume_min: 16.0,
            volume_max: 24.0,
            n_points: 11,
            ..SyntheticSpec::default()
        })
        .unwrap();

        let guess = initial_guess(&samples).unwrap();
        let fit = LeastSquaresFitter::default().fit(model, &guess, &samples).unwrap();

        assert!(matches!(fit.state, FitState::Converged { .. }), "{model}: {:?}", fit.state);
        let (got, want) = (fit.params.to_array(), truth.to_array());
        for i in 0..4 {
            assert!(
                rel_err(got[i], want[i]) < 1e-6,
                "{model} {}: got {} want {}",
                ParameterVector::NAMES[i],
                got[i],
                want[i]
            );
        }
    }
}

#[test]
fn surrogate_never_worse_than_initial_guess() {
    let samples = reference_dataset();
    let guess = initial_guess(&samples).unwrap();
    let guess_sse = sse(ModelKind::Murnaghan, &guess, &samples).unwrap();

    let optimizer = SurrogateOptimizer::new(SurrogateConfig {
        iterations: 10,
        candidates: 256,
        hyper_max_iters: 20,
        ..SurrogateConfig::default()
    });
    let fit = optimizer.fit(ModelKind::Murnaghan, &guess, &samples).unwrap();

    assert_eq!(fit.strategy, FitStrategy::Surrogate);
    assert!(fit.quality.sse <= guess_sse * (1.0 + 1e-9));
    let history = &fit.diagnostics.best_history;
    assert_eq!(history.len(), fit.diagnostics.iterations + 1);
    assert!(history.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(history.last().copied(), Some(fit.quality.sse));
}

#[test]
fn csv_round_trip_through_the_pipeline() {
    let samples = generate_synthetic(&SyntheticSpec {
        model: ModelKind::Vinet,
        ..SyntheticSpec::default()
    })
    .unwrap();
    let mut buf = Vec::new();
    write_samples_csv(&mut buf, &samples).unwrap();

    let ingest = read_samples(Cursor::new(buf), "memory").unwrap();
    assert_eq!(ingest.rows_used, samples.len());
    assert!(ingest.row_errors.is_empty());

    let config = FitConfig {
        model_spec: ModelSpec::Auto,
        ..FitConfig::default()
    };
    let run = run_fit_on(&config, ingest).unwrap();
    assert_eq!(run.selection.best.model, ModelKind::Vinet);
    assert_eq!(run.residuals.len(), samples.len());
    assert!(run.residuals.iter().all(|r| r.residual.abs() < 1e-6));
}

#[test]
fn exported_curve_reloads() {
    let run = run_fit(&FitConfig::default()).unwrap();
    let path = std::env::temp_dir().join(format!("eos-fit-curve-{}.json", std::process::id()));

    write_curve_json(&path, &run.selection.best, &run.ingest.stats).unwrap();
    let curve = read_curve_json(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(curve.model, ModelKind::Murnaghan);
    let (got, want) = (curve.params.to_array(), run.selection.best.params.to_array());
    assert!(got.iter().zip(want).all(|(g, w)| rel_err(*g, w) < 1e-12));
    assert_eq!(curve.grid.volume.len(), curve.grid.energy.len());
    assert!(rel_err(curve.grid.volume[0], run.ingest.stats.volume_min) < 1e-12);
}
