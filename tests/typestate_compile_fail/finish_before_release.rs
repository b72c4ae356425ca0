/// This test should FAIL to compile
/// Attempting to finish a resolved run before its context is released

use timebox::core::lifecycle::Run;
use timebox::testing::fake::{FakeBackend, FakeMode};
use timebox::{Deadline, MemorySink, SupervisorConfig};

fn main() {
    let backend = FakeBackend::new(FakeMode::Inline);
    let config = SupervisorConfig::default();
    let sink = MemorySink::new();

    let run = Run::new(None, Deadline::from_millis(100).expect("deadline"))
        .launch(&backend, Box::new(Vec::<u8>::new), &config)
        .expect("launch failed")
        .join(&config)
        .expect("join failed");

    // This should fail: Resolved doesn't have a finish method
    // Only Released can classify and emit
    let _ = run.finish::<u32, String>(&sink);
}
