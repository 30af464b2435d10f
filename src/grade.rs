/// Grade values arrive as free text from the gradebook UI, with either a
/// decimal comma or a decimal dot. An unparsable value means "no numeric
/// grade", never an error: rules must skip it, not fail the student.
pub fn normalize_grade(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    let canonical = t.replace(',', ".");
    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_and_dot_both_parse() {
        assert_eq!(normalize_grade("18,5"), Some(18.5));
        assert_eq!(normalize_grade("18.5"), Some(18.5));
        assert_eq!(normalize_grade(" 20 "), Some(20.0));
    }

    #[test]
    fn junk_is_absent_not_an_error() {
        assert_eq!(normalize_grade("abc"), None);
        assert_eq!(normalize_grade(""), None);
        assert_eq!(normalize_grade("  "), None);
        assert_eq!(normalize_grade("1,2,3"), None);
        assert_eq!(normalize_grade("NaN"), None);
    }
}
