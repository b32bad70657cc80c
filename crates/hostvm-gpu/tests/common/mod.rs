//! Shared helpers for `hostvm-gpu` integration tests.

#![allow(dead_code)]

pub fn require_webgpu() -> bool {
    let Ok(raw) = std::env::var("HOSTVM_REQUIRE_WEBGPU") else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

pub fn skip_or_panic(test_name: &str, reason: &str) {
    if require_webgpu() {
        panic!("HOSTVM_REQUIRE_WEBGPU is enabled but {test_name} cannot run: {reason}");
    }
    eprintln!("skipping {test_name}: {reason}");
}

pub fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let off = (y as usize * width as usize + x as usize) * 4;
    [buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]
}
