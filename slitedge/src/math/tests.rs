use super::pca::Pca;
use super::polynomial::{RejectParams, fit_weighted, rms, robust_fit};
use super::*;

// =============================================================================
// Statistics
// =============================================================================

#[test]
fn test_median_odd_and_even() {
    let mut odd = vec![5.0, 1.0, 3.0];
    assert_eq!(median_mut(&mut odd), 3.0);

    let mut even = vec![4.0, 1.0, 3.0, 2.0];
    assert_eq!(median_mut(&mut even), 2.5);
}

#[test]
fn test_median_of_skips_non_finite() {
    assert_eq!(median_of([1.0, f64::NAN, 3.0, 2.0]), Some(2.0));
    assert_eq!(median_of(std::iter::empty()), None);
}

#[test]
fn test_robust_sigma_ignores_outlier() {
    let mut values: Vec<f64> = (0..101).map(|i| (i % 3) as f64 - 1.0).collect();
    values.push(1000.0);
    let sigma = robust_sigma(&values);
    assert!(sigma < 2.0, "sigma {sigma} should not be inflated by the outlier");
}

#[test]
fn test_robust_sigma_constant_is_zero() {
    assert_eq!(robust_sigma(&[2.0; 10]), 0.0);
    assert_eq!(robust_sigma(&[2.0]), 0.0);
}

// =============================================================================
// Basis functions and fitting
// =============================================================================

#[test]
fn test_legendre_basis_values() {
    let mut b = [0.0; 4];
    FunctionFamily::Legendre.basis(0.5, &mut b);
    assert!((b[0] - 1.0).abs() < 1e-12);
    assert!((b[1] - 0.5).abs() < 1e-12);
    assert!((b[2] - (-0.125)).abs() < 1e-12); // (3x²-1)/2
    assert!((b[3] - (-0.4375)).abs() < 1e-12); // (5x³-3x)/2
}

#[test]
fn test_chebyshev_basis_values() {
    let mut b = [0.0; 3];
    FunctionFamily::Chebyshev.basis(0.5, &mut b);
    assert!((b[2] - (-0.5)).abs() < 1e-12); // 2x²-1
}

#[test]
fn test_fit_recovers_quadratic() {
    let xs: Vec<f64> = (0..50).map(|i| i as f64).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 3.0 + 0.2 * x - 0.01 * x * x).collect();
    let w = vec![1.0; xs.len()];

    for family in [
        FunctionFamily::Legendre,
        FunctionFamily::Chebyshev,
        FunctionFamily::Polynomial,
    ] {
        let curve = fit_weighted(family, (0.0, 49.0), &xs, &ys, &w, 2).unwrap();
        assert!(rms(&curve, &xs, &ys) < 1e-8, "{family:?}");
        assert!((curve.eval(10.0) - 4.0).abs() < 1e-8);
    }
}

#[test]
fn test_fit_caps_order_at_point_count() {
    let xs = [0.0, 10.0];
    let ys = [1.0, 3.0];
    let curve = fit_weighted(FunctionFamily::Legendre, (0.0, 10.0), &xs, &ys, &[1.0, 1.0], 5).unwrap();
    assert_eq!(curve.coeffs.len(), 6);
    assert!((curve.eval(5.0) - 2.0).abs() < 1e-9);
}

#[test]
fn test_fit_ignores_zero_weights() {
    let xs = [0.0, 1.0, 2.0, 3.0];
    let ys = [1.0, 1.0, 100.0, 1.0];
    let curve =
        fit_weighted(FunctionFamily::Polynomial, (0.0, 3.0), &xs, &ys, &[1.0, 1.0, 0.0, 1.0], 0).unwrap();
    assert!((curve.coeffs[0] - 1.0).abs() < 1e-9);
}

#[test]
fn test_robust_fit_rejects_outliers() {
    let xs: Vec<f64> = (0..100).map(|i| i as f64).collect();
    let mut ys: Vec<f64> = xs.iter().map(|x| 20.0 + 0.05 * x).collect();
    ys[10] += 15.0;
    ys[70] -= 12.0;

    let params = RejectParams {
        max_iterations: 5,
        sigma: 3.0,
        floor: 0.5,
        min_points: 10,
    };
    let fit = robust_fit(FunctionFamily::Legendre, (0.0, 99.0), &xs, &ys, 2, params).unwrap();

    assert_eq!(fit.weights[10], 0.0);
    assert_eq!(fit.weights[70], 0.0);
    assert_eq!(fit.rejected, 2);
    assert!((fit.curve.eval(50.0) - 22.5).abs() < 1e-6);
}

#[test]
fn test_robust_fit_fails_with_too_few_points() {
    let xs = [0.0, 1.0, 2.0];
    let ys = [0.0, f64::NAN, 2.0];
    let params = RejectParams {
        max_iterations: 3,
        sigma: 3.0,
        floor: 0.5,
        min_points: 3,
    };
    let err = robust_fit(FunctionFamily::Legendre, (0.0, 2.0), &xs, &ys, 1, params).unwrap_err();
    assert_eq!(err, 2);
}

// =============================================================================
// PCA
// =============================================================================

#[test]
fn test_pca_single_direction() {
    // Observations along (1, 2, 0) offset by (5, 5, 5).
    let obs: Vec<Vec<f64>> = (0..6)
        .map(|i| {
            let t = i as f64 - 2.5;
            vec![5.0 + t, 5.0 + 2.0 * t, 5.0]
        })
        .collect();

    let pca = Pca::fit(&obs, 2).unwrap();
    assert!(pca.explained[0] > 0.999);

    let c = &pca.components[0];
    let ratio = c[1] / c[0];
    assert!((ratio - 2.0).abs() < 1e-9);

    for (i, o) in obs.iter().enumerate() {
        let rebuilt = pca.reconstruct(&pca.scores[i]);
        for (a, b) in rebuilt.iter().zip(o) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}

#[test]
fn test_pca_needs_two_observations() {
    assert!(Pca::fit(&[vec![1.0, 2.0]], 1).is_none());
    assert!(Pca::fit(&[vec![1.0, 2.0], vec![1.0]], 1).is_none());
}

#[test]
fn test_pca_caps_components() {
    let obs = vec![vec![0.0, 1.0, 2.0], vec![1.0, 0.0, 2.0], vec![2.0, 2.0, 0.0]];
    let pca = Pca::fit(&obs, 10).unwrap();
    assert_eq!(pca.num_components(), 2);
}
