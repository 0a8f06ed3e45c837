//! Minimal TAP (Test Anything Protocol) harness for on-target tests.
//!
//! Tests registered with `#[tap_test]` are collected through `inventory`
//! and run by the `device-tests` binary, which prints TAP to the console.
//! The same binary runs on the host and on an ESP32 over USB serial, so
//! driver code can be checked against the simulated chip and the real one
//! with one set of tests.
//!
//! Only compiled with the `tap-tests` feature.
//!
//! ```ignore
//! #[cfg(feature = "tap-tests")]
//! mod tap_tests {
//!     use cc110x_rs_macros::tap_test;
//!
//!     #[tap_test]
//!     fn fifo_holds_sixty_four_bytes() {
//!         assert_eq!(HwFifo::new().capacity(), 64);
//!     }
//!
//!     #[tap_test(should_panic = "RX FIFO underflow")]
//!     fn empty_fifo_read_faults() {
//!         let bus = SharedBus::new(SimulatedChip::new(SimConfig::default(), TunnelConfig::default()));
//!         let _ = bus.read_fifo(1);
//!     }
//! }
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub use inventory;

/// Return type of fallible TAP tests.
pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// What a test has to do to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Return `Ok` without panicking.
    Success,
    /// Panic with any message.
    Panic,
    /// Panic with a message containing the given text.
    PanicWith(&'static str),
}

/// One collected test, submitted by `#[tap_test]`.
#[derive(Debug)]
pub struct TapTestEntry {
    pub name: &'static str,
    pub expect: Expect,
    pub body: fn() -> TestResult,
}

inventory::collect!(TapTestEntry);

/// Collected tests in name order; `inventory` order is link order.
pub fn collected() -> Vec<&'static TapTestEntry> {
    let mut entries: Vec<_> = inventory::iter::<TapTestEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Run every collected test. Returns true when all passed.
pub fn run_all_tests() -> bool {
    let entries = collected();
    let mut runner = TestRunner::default();
    runner.print_plan(entries.len());
    for entry in entries {
        runner.run_entry(entry);
    }
    runner.finish()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    match payload.downcast_ref::<String>() {
        Some(s) => s.clone(),
        None => "<non-string panic payload>".to_string(),
    }
}

/// Decide a test's verdict. `None` means it passed, otherwise the
/// diagnostic to print.
fn judge(expect: Expect, outcome: Result<TestResult, String>) -> Option<String> {
    match (expect, outcome) {
        (Expect::Success, Ok(Ok(()))) => None,
        (Expect::Success, Ok(Err(e))) => Some(format!("returned error: {}", e)),
        (Expect::Success, Err(msg)) => Some(format!("panicked: {}", msg)),
        (Expect::Panic, Err(_)) => None,
        (Expect::PanicWith(want), Err(msg)) if msg.contains(want) => None,
        (Expect::PanicWith(want), Err(msg)) => {
            Some(format!("panic {:?} does not contain {:?}", msg, want))
        }
        (_, Ok(_)) => Some("expected a panic, test returned".to_string()),
    }
}

#[derive(Debug)]
struct Record {
    name: String,
    failure: Option<String>,
}

/// Runs tests and prints one TAP line per test.
#[derive(Debug, Default)]
pub struct TestRunner {
    records: Vec<Record>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_entry(&mut self, entry: &TapTestEntry) {
        self.run(entry.name, entry.expect, entry.body);
    }

    /// Run `body` and record its verdict against `expect`.
    pub fn run(&mut self, name: &str, expect: Expect, body: impl FnOnce() -> TestResult) {
        let outcome = catch_unwind(AssertUnwindSafe(body)).map_err(|p| panic_message(&*p));
        let failure = judge(expect, outcome);

        let number = self.records.len() + 1;
        match &failure {
            None => println!("ok {} - {}", number, name),
            Some(diagnostic) => {
                println!("not ok {} - {}", number, name);
                println!("  ---");
                println!("  message: {:?}", diagnostic);
                println!("  ...");
            }
        }
        self.records.push(Record {
            name: name.to_string(),
            failure,
        });
    }

    pub fn print_plan(&self, planned: usize) {
        println!("TAP version 14");
        println!("1..{}", planned);
    }

    /// Print a diagnostic line.
    pub fn comment(msg: &str) {
        println!("# {}", msg);
    }

    pub fn executed(&self) -> usize {
        self.records.len()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.failure.is_some()).count()
    }

    pub fn passed(&self) -> usize {
        self.executed() - self.failed()
    }

    /// Print the summary. Returns true if nothing failed.
    pub fn finish(&self) -> bool {
        Self::comment(&format!("{} passed, {} failed", self.passed(), self.failed()));
        for record in self.records.iter().filter(|r| r.failure.is_some()) {
            Self::comment(&format!("failed: {}", record.name));
        }
        self.failed() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc110x_rs_macros::device_test;

    #[device_test]
    fn verdicts() {
        assert_eq!(judge(Expect::Success, Ok(Ok(()))), None);
        assert!(judge(Expect::Success, Ok(Err("spi".into()))).is_some());
        assert!(judge(Expect::Success, Err("boom".into())).is_some());
        assert_eq!(judge(Expect::Panic, Err("boom".into())), None);
        assert_eq!(judge(Expect::PanicWith("fault"), Err("protocol fault".into())), None);
        assert!(judge(Expect::PanicWith("fault"), Err("other".into())).is_some());
        assert!(judge(Expect::Panic, Ok(Ok(()))).is_some());
    }
}

mod tap_tests {
    use super::*;
    use cc110x_rs_macros::tap_test;

    #[tap_test]
    fn runner_counts_results() {
        let mut runner = TestRunner::new();
        runner.run("pass", Expect::Success, || Ok(()));
        runner.run("fail", Expect::Success, || Err("spi timeout".into()));
        runner.run("panics", Expect::Success, || panic!("fifo overflow"));
        assert_eq!(runner.executed(), 3);
        assert_eq!(runner.passed(), 1);
        assert_eq!(runner.failed(), 2);
    }

    #[tap_test]
    fn expected_panics_check_message() {
        let mut runner = TestRunner::new();
        runner.run("match", Expect::PanicWith("protocol fault"), || panic!("protocol fault: x"));
        runner.run("mismatch", Expect::PanicWith("protocol fault"), || panic!("other"));
        runner.run("no panic", Expect::Panic, || Ok(()));
        assert_eq!(runner.passed(), 1);
        assert_eq!(runner.failed(), 2);
    }

    #[tap_test]
    fn collection_is_sorted() -> TestResult {
        let names: Vec<_> = collected().iter().map(|e| e.name).collect();
        if names.windows(2).all(|w| w[0] <= w[1]) {
            Ok(())
        } else {
            Err(format!("unsorted: {:?}", names).into())
        }
    }
}
