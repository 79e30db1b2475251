/// Configuration of the JSON decoder.
///
/// # Examples
///
/// ```rust
/// use jsonpayload::DecoderOptions;
///
/// let options = DecoderOptions {
///     max_depth: Some(32),
///     ..Default::default()
/// };
/// assert!(!options.keep_integral_doubles);
/// ```
///
/// # Default
///
/// No depth limit, integral numbers stored as integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderOptions {
    /// Reject documents nested deeper than this many objects and arrays.
    ///
    /// # Default
    ///
    /// `None`
    pub max_depth: Option<usize>,

    /// Store non-indexed numbers without a fractional part as doubles.
    ///
    /// When `false`, such numbers are stored as integers, so `1.0` reads back
    /// as `1`. Numbers outside the `i64` range are always doubles.
    ///
    /// # Default
    ///
    /// `false`
    pub keep_integral_doubles: bool,

    #[cfg(any(test, feature = "fuzzing"))]
    /// Panic on decode errors instead of returning them.
    ///
    /// Enabled only in test builds to produce backtraces on failures.
    pub panic_on_error: bool,
}
