use std::fmt;

use crate::value::{approx_eq, format_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    Empty,
    /// Fewer samples than the statistic needs.
    TooFew(usize),
    LengthMismatch,
    ZeroVariance,
}

pub fn sum(xs: &[f64]) -> f64 {
    xs.iter().sum()
}

pub fn product(xs: &[f64]) -> f64 {
    xs.iter().product()
}

pub fn mean(xs: &[f64]) -> Result<f64, StatsError> {
    if xs.is_empty() {
        return Err(StatsError::Empty);
    }
    Ok(sum(xs) / xs.len() as f64)
}

pub fn median(xs: &[f64]) -> Result<f64, StatsError> {
    if xs.is_empty() {
        return Err(StatsError::Empty);
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Ok(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Sample variance (n - 1 denominator).
pub fn variance(xs: &[f64]) -> Result<f64, StatsError> {
    if xs.len() < 2 {
        return Err(StatsError::TooFew(2));
    }
    let m = mean(xs)?;
    Ok(xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64)
}

pub fn stdev(xs: &[f64]) -> Result<f64, StatsError> {
    variance(xs).map(f64::sqrt)
}

pub fn min(xs: &[f64]) -> Result<f64, StatsError> {
    xs.iter().copied().reduce(f64::min).ok_or(StatsError::Empty)
}

pub fn max(xs: &[f64]) -> Result<f64, StatsError> {
    xs.iter().copied().reduce(f64::max).ok_or(StatsError::Empty)
}

/// Pearson correlation coefficient.
pub fn correlation(xs: &[f64], ys: &[f64]) -> Result<f64, StatsError> {
    if xs.len() != ys.len() {
        return Err(StatsError::LengthMismatch);
    }
    if xs.len() < 2 {
        return Err(StatsError::TooFew(2));
    }
    let (mx, my) = (mean(xs)?, mean(ys)?);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if approx_eq(sxx, 0.0) || approx_eq(syy, 0.0) {
        return Err(StatsError::ZeroVariance);
    }
    Ok(sxy / (sxx * syy).sqrt())
}

/// Outcome of a hypothesis test. Fields are reachable by name from the
/// language (`r.p`, `r["statistic"]`).
#[derive(Debug, Clone, PartialEq)]
pub struct StatTestResult {
    pub test: &'static str,
    pub statistic: f64,
    pub df: Option<f64>,
    pub p_value: f64,
}

impl StatTestResult {
    pub const FIELDS: [&'static str; 3] = ["statistic", "df", "p"];

    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "statistic" | "t" | "z" => Some(self.statistic),
            "df" => self.df,
            "p" | "p_value" => Some(self.p_value),
            _ => None,
        }
    }

    pub fn approx_eq(&self, other: &StatTestResult) -> bool {
        self.test == other.test
            && approx_eq(self.statistic, other.statistic)
            && approx_eq(self.p_value, other.p_value)
            && match (self.df, other.df) {
                (Some(a), Some(b)) => approx_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl fmt::Display for StatTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: statistic = {}", self.test, format_number(self.statistic))?;
        if let Some(df) = self.df {
            write!(f, ", df = {}", format_number(df))?;
        }
        write!(f, ", p = {}", format_number(self.p_value))
    }
}

/// One-sample t-test of `xs` against `mu`, two-sided.
pub fn ttest_one(xs: &[f64], mu: f64) -> Result<StatTestResult, StatsError> {
    let sd = stdev(xs)?;
    if approx_eq(sd, 0.0) {
        return Err(StatsError::ZeroVariance);
    }
    let n = xs.len() as f64;
    let t = (mean(xs)? - mu) / (sd / n.sqrt());
    let df = n - 1.0;
    Ok(StatTestResult {
        test: "one-sample t-test",
        statistic: t,
        df: Some(df),
        p_value: 2.0 * student_t_sf(t.abs(), df),
    })
}

/// Welch's two-sample t-test, two-sided.
pub fn ttest_welch(xs: &[f64], ys: &[f64]) -> Result<StatTestResult, StatsError> {
    let (vx, vy) = (variance(xs)?, variance(ys)?);
    let (nx, ny) = (xs.len() as f64, ys.len() as f64);
    let se2 = vx / nx + vy / ny;
    if approx_eq(se2, 0.0) {
        return Err(StatsError::ZeroVariance);
    }
    let t = (mean(xs)? - mean(ys)?) / se2.sqrt();
    let df = se2.powi(2) / ((vx / nx).powi(2) / (nx - 1.0) + (vy / ny).powi(2) / (ny - 1.0));
    Ok(StatTestResult {
        test: "Welch two-sample t-test",
        statistic: t,
        df: Some(df),
        p_value: 2.0 * student_t_sf(t.abs(), df),
    })
}

/// One-sample z-test with known population standard deviation `sigma`.
pub fn ztest(xs: &[f64], mu: f64, sigma: f64) -> Result<StatTestResult, StatsError> {
    if approx_eq(sigma, 0.0) {
        return Err(StatsError::ZeroVariance);
    }
    let n = xs.len() as f64;
    let z = (mean(xs)? - mu) / (sigma / n.sqrt());
    Ok(StatTestResult {
        test: "z-test",
        statistic: z,
        df: None,
        p_value: 2.0 * (1.0 - normal_cdf(z.abs())),
    })
}

pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun 7.1.26.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Upper tail of Student's t with `df` degrees of freedom, for `t >= 0`.
fn student_t_sf(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    0.5 * incomplete_beta(df / 2.0, 0.5, x)
}

fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    let mut y = x;
    for c in COEFFS {
        y += 1.0;
        series += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Regularised incomplete beta `I_x(a, b)`.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_fraction(a: f64, b: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-30;
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..200 {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < 3e-14 {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptive_statistics() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&xs), Ok(5.0));
        assert_eq!(median(&xs), Ok(4.5));
        assert!((variance(&xs).expect("enough samples") - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(min(&xs), Ok(2.0));
        assert_eq!(max(&xs), Ok(9.0));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(mean(&[]), Err(StatsError::Empty));
        assert_eq!(variance(&[1.0]), Err(StatsError::TooFew(2)));
    }

    #[test]
    fn perfect_correlation() {
        let r = correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).expect("defined");
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normal_cdf_matches_known_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn t_test_p_value_is_plausible() {
        let result = ttest_one(&[5.1, 4.9, 5.3, 5.0, 4.8], 5.0).expect("computable");
        assert!(result.p_value > 0.5 && result.p_value <= 1.0);
        let result = ttest_one(&[10.1, 10.3, 9.9, 10.2, 10.0], 5.0).expect("computable");
        assert!(result.p_value < 1e-4);
        assert_eq!(result.field("df"), Some(4.0));
    }

    #[test]
    fn t_distribution_reference_value() {
        // t = 2.776 with 4 degrees of freedom is the 97.5th percentile.
        let p = 2.0 * student_t_sf(2.776, 4.0);
        assert!((p - 0.05).abs() < 1e-3);
    }
}
