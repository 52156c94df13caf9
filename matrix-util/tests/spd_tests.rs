use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_util::*;
use matrix_util::traits::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn spd_inverse_and_log_det() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(17);
    let aa = DMatrix::<f64>::rnorm(5, 5, &mut rng);
    let xx = &aa * aa.transpose() + DMatrix::identity(5, 5);

    let inv = xx.spd_inverse()?;
    let eye = &xx * &inv;
    for i in 0..5 {
        for j in 0..5 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(eye[(i, j)], expected, epsilon = 1e-8);
        }
    }

    let det = xx.clone().determinant();
    assert_abs_diff_eq!(xx.spd_log_det()?, det.ln(), epsilon = 1e-8);
    Ok(())
}

#[test]
fn not_positive_definite() {
    let xx = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
    assert!(xx.spd_inverse().is_err());
    assert!(xx.spd_log_det().is_err());
}

#[test]
fn log_sum_exp_stable() {
    let xx = [1000.0, 1000.0];
    assert_abs_diff_eq!(log_sum_exp(&xx), 1000.0 + 2f64.ln(), epsilon = 1e-10);
}

#[test]
fn row_major_reshape() -> anyhow::Result<()> {
    let xx = DMatrix::<f64>::from_row_major(2, 3, &[1., 2., 3., 4., 5., 6.])?;
    assert_eq!(xx[(0, 2)], 3.0);
    assert_eq!(xx[(1, 0)], 4.0);
    assert_eq!(xx.flatten_row_major(), vec![1., 2., 3., 4., 5., 6.]);
    assert!(DMatrix::<f64>::from_row_major(2, 2, &[1.0]).is_err());
    Ok(())
}
