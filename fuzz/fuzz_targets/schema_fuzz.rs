//! Schema fuzz target: feed arbitrary text through parse, resolve and registry build.
//! None of the stages may panic; each returns Ok or a SchemaError.
//! Build with: cargo fuzz run schema_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(reg) = hl7tree::SchemaRegistry::load(s) {
        for m in reg.messages() {
            let _ = reg.new_message(m.name());
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_fuzz");
}
