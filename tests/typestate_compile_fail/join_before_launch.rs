/// This test should FAIL to compile
/// Attempting to join a run that was never launched

use timebox::core::lifecycle::Run;
use timebox::{Deadline, SupervisorConfig};

fn main() {
    let run = Run::new(None, Deadline::from_millis(100).expect("deadline"));

    // This should fail: Created doesn't have a join method
    let _ = run.join(&SupervisorConfig::default());
}
