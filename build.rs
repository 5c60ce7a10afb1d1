//! Build script which collects build-time information for the output metadata.
fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");
}
