/// Runner without process isolation, for debugging and fork-less hosts
///
/// The test runs on the calling thread. Nothing is captured and no timeout
/// applies; a panic becomes a failed result carrying the panic message.
use crate::config::types::{TestOutput, TestResult};
use crate::exec::runner::TestRunner;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineRunner;

impl InlineRunner {
    pub fn new() -> Self {
        InlineRunner
    }

    pub fn run_test<F>(&self, test: F) -> TestResult
    where
        F: FnOnce() -> TestResult,
    {
        match panic::catch_unwind(AssertUnwindSafe(test)) {
            Ok(result) => result,
            Err(payload) => TestResult::fail(panic_message(payload.as_ref())),
        }
    }
}

impl TestRunner for InlineRunner {
    fn run(&self, test: &dyn Fn() -> TestResult, _output: &mut TestOutput) -> TestResult {
        self.run_test(test)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_result_unchanged() {
        let result = InlineRunner::new().run_test(|| TestResult::fail("nope"));
        assert_eq!(result, TestResult::fail("nope"));
    }

    #[test]
    fn panic_message_becomes_failure() {
        let result = InlineRunner::new().run_test(|| panic!("index {} out of range", 7));
        assert_eq!(result, TestResult::fail("index 7 out of range"));
    }

    #[test]
    fn static_str_panic_payload() {
        let result = InlineRunner::new().run_test(|| panic!("boom"));
        assert_eq!(result.message, "boom");
    }

    #[test]
    fn usable_through_trait_object() {
        let runner: Box<dyn TestRunner> = Box::new(InlineRunner);
        let mut output = TestOutput::new();
        let result = runner.run(&|| TestResult::pass("ok"), &mut output);
        assert!(result.passed);
        assert!(output.is_empty());
    }
}
