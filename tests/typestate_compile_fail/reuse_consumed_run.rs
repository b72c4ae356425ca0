/// This test should FAIL to compile
/// Attempting to launch a run after it has been consumed

use timebox::core::lifecycle::Run;
use timebox::testing::fake::{FakeBackend, FakeMode};
use timebox::{Deadline, SupervisorConfig};

fn main() {
    let backend = FakeBackend::new(FakeMode::Inline);
    let config = SupervisorConfig::default();
    let run = Run::new(None, Deadline::from_millis(100).expect("deadline"));

    // First launch consumes run
    let _running = run.launch(&backend, Box::new(Vec::<u8>::new), &config);

    // This should fail: run was moved and can no longer be used
    let _ = run.launch(&backend, Box::new(Vec::<u8>::new), &config);
}
