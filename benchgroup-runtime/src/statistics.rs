//! Statistical functions for sample summaries
//!
//! The sampler records seconds-per-operation for every sample and derives the
//! ops/sec figure and its relative margin of error from these helpers.

/// Two-sided 95% Student-t critical values for 1..=30 degrees of freedom
const T_TABLE: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.16,
    2.145, 2.131, 2.12, 2.11, 2.101, 2.093, 2.086, 2.08, 2.074, 2.069, 2.064, 2.06, 2.056, 2.052,
    2.048, 2.045, 2.042,
];

/// Critical value used once the table runs out
const T_INFINITY: f64 = 1.96;

/// Calculate the arithmetic mean of a slice of values
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate the sample variance (n - 1 denominator) of a slice of values
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let m = mean(values);
    values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Calculate the standard deviation of a slice of values
pub fn standard_deviation(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Standard error of the mean
pub fn standard_error(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    standard_deviation(values) / (values.len() as f64).sqrt()
}

/// Two-sided 95% critical value for the given degrees of freedom
pub fn t_critical(degrees_of_freedom: usize) -> f64 {
    match degrees_of_freedom {
        0 => T_TABLE[0],
        df if df <= T_TABLE.len() => T_TABLE[df - 1],
        _ => T_INFINITY,
    }
}

/// Margin of error of the mean as a percentage of the mean
pub fn relative_margin_of_error(values: &[f64]) -> f64 {
    let m = mean(values);
    if values.len() < 2 || m <= 0.0 {
        return 0.0;
    }

    let margin = standard_error(values) * t_critical(values.len() - 1);
    margin / m * 100.0
}
