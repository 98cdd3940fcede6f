//! Human-readable sizes and durations for logs

/// Binary size, e.g. `1.5MiB`
pub fn format_bytes(bytes: u64) -> String {
    let mut num = bytes as f64;
    for unit in ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"] {
        if num.abs() < 1024.0 {
            return format!("{:3.1}{}B", num, unit);
        }
        num /= 1024.0;
    }
    format!("{:.1}YiB", num)
}

/// Duration with the largest unit that keeps the value readable, e.g. `2.50 s`
pub fn format_duration(seconds: f64) -> String {
    const STEPS: [(f64, &str); 5] = [
        (1e3, "ms"),
        (1e3, "s"),
        (60.0, "min"),
        (60.0, "hrs"),
        (24.0, "days"),
    ];

    let mut value = seconds * 1e6;
    let mut unit = "us";
    for (ratio, name) in STEPS {
        if value / ratio < 0.3 {
            break;
        }
        value /= ratio;
        unit = name;
    }
    format!("{:.2} {}", value, unit)
}
