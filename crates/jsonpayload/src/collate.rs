//! String collation used by ordered comparisons of payload fields.
use core::{cmp::Ordering, iter::Peekable, str::Chars};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollateMode {
    /// Plain byte-wise comparison.
    #[default]
    None,
    /// ASCII letters compare case-insensitively.
    Ascii,
    /// Unicode letters compare by their lowercase mapping.
    Utf8,
    /// Runs of decimal digits compare by numeric value (`"a2" < "a10"`).
    Numeric,
}

/// Collation settings for one compared field.
///
/// # Default
///
/// [`CollateMode::None`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollateOpts {
    pub mode: CollateMode,
}

impl CollateOpts {
    #[must_use]
    pub const fn new(mode: CollateMode) -> Self {
        Self { mode }
    }
}

impl From<CollateMode> for CollateOpts {
    fn from(mode: CollateMode) -> Self {
        Self { mode }
    }
}

/// Compares two strings under `opts`.
#[must_use]
pub fn collate_compare(a: &str, b: &str, opts: &CollateOpts) -> Ordering {
    match opts.mode {
        CollateMode::None => a.cmp(b),
        CollateMode::Ascii => a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
        CollateMode::Utf8 => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
        CollateMode::Numeric => numeric_compare(a, b),
    }
}

fn numeric_compare(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let ord = compare_digit_runs(&mut a, &mut b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}

fn compare_digit_runs(a: &mut Peekable<Chars<'_>>, b: &mut Peekable<Chars<'_>>) -> Ordering {
    fn skip_zeros(it: &mut Peekable<Chars<'_>>) {
        while it.next_if_eq(&'0').is_some() {}
    }

    skip_zeros(a);
    skip_zeros(b);
    // Equal-length digit runs compare lexicographically; otherwise the longer
    // run is the larger number.
    let mut ord = Ordering::Equal;
    loop {
        match (a.next_if(char::is_ascii_digit), b.next_if(char::is_ascii_digit)) {
            (Some(x), Some(y)) => {
                if ord == Ordering::Equal {
                    ord = x.cmp(&y);
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return ord,
        }
    }
}
