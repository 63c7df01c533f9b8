//! Numeric coercions with ECMAScript's exact truncation semantics.

/// `ToInt32`: modulo-2^32 truncation; NaN/±Infinity map to 0.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let n = n.trunc();
    let m = n.rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

/// `ToUint32`: modulo-2^32 truncation; NaN/±Infinity map to 0.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let n = n.trunc();
    n.rem_euclid(4294967296.0) as u32
}

/// Renders a double the way `Number.prototype.toString()` would: integers
/// without a trailing `.0`, and the shortest round-tripping decimal
/// otherwise (delegated to `ryu_js`, the same shortest-float algorithm
/// family used by V8's number-to-string fast path).
pub fn double_to_string(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d == 0.0 {
        return if d.is_sign_negative() {
            "0".to_string()
        } else {
            "0".to_string()
        };
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if d == d.trunc() && d.abs() < 1e21 {
        return format!("{}", d as i64);
    }
    ryu_js::Buffer::new().format(d).to_string()
}
