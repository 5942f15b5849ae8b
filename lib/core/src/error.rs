//! Shared result type.
//!
//! Domain error enums live next to the code that raises them. Where a call
//! crosses a layer (backend fetches made during server rendering, for
//! instance) the error travels as a rootcause `Report` so callers can
//! attach their own context.

use rootcause::Report;

/// Result carrying a rootcause report over the context type `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    struct Unreachable;

    impl fmt::Display for Unreachable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("backend unreachable")
        }
    }

    impl std::error::Error for Unreachable {}

    fn fetch(fail: bool) -> Result<u16, Unreachable> {
        if fail {
            return Err(Unreachable.into());
        }
        Ok(200)
    }

    #[test]
    fn report_keeps_its_context() {
        assert_eq!(fetch(false).expect("ok"), 200);
        let report = fetch(true).expect_err("should fail");
        assert_eq!(report.current_context(), &Unreachable);
    }
}
