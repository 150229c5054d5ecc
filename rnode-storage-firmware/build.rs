//! Build script for rnode-storage-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates storage.toml and turns it into constants

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Must match the core's path limit
const MAX_PATH_LEN: usize = 128;
/// Must match the flash back end's path limit
const FLASH_MAX_PATH_LEN: usize = 64;
/// Must match the core's preserved set limit
const MAX_PRESERVED: usize = 8;
const FLASH_SIZE: i64 = 2 * 1024 * 1024;
const ERASE_SIZE: i64 = 4096;

fn main() {
    setup_linker();
    let config = load_config();
    let errors = validate(&config);
    if !errors.is_empty() {
        fail("Invalid storage configuration", &errors);
    }
    generate(&config);
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Parsed storage.toml
struct StorageToml {
    canary_path: String,
    canary_payload: String,
    preserved: Vec<String>,
    partition_offset: i64,
    partition_size: i64,
}

fn load_config() -> StorageToml {
    println!("cargo:rerun-if-changed=storage.toml");

    let config_path = Path::new("storage.toml");
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: storage.toml not found!                                  ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a storage.toml configuration file.        ║\n\
            ║  Please create one in the rnode-storage-firmware directory.      ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read storage.toml                              ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let value: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => fail("Invalid TOML syntax in storage.toml", &[e.to_string()]),
    };

    let mut errors = Vec::new();
    let canary_path = string_at(&value, "canary", "path", &mut errors);
    let canary_payload = string_at(&value, "canary", "payload", &mut errors);
    let partition_offset = integer_at(&value, "partition", "offset", &mut errors);
    let partition_size = integer_at(&value, "partition", "size", &mut errors);

    let preserved = match value.get("preserve").and_then(|p| p.get("paths")) {
        Some(toml::Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item.as_str() {
                Some(path) => Some(path.to_string()),
                None => {
                    errors.push(format!("[preserve] paths[{}] must be a string", i));
                    None
                }
            })
            .collect(),
        Some(_) => {
            errors.push("[preserve] paths must be an array".to_string());
            Vec::new()
        }
        None => {
            errors.push("[preserve] missing 'paths'".to_string());
            Vec::new()
        }
    };

    if !errors.is_empty() {
        fail("Incomplete storage configuration", &errors);
    }

    StorageToml {
        canary_path,
        canary_payload,
        preserved,
        partition_offset,
        partition_size,
    }
}

fn string_at(value: &toml::Value, table: &str, key: &str, errors: &mut Vec<String>) -> String {
    match value.get(table).and_then(|t| t.get(key)) {
        Some(toml::Value::String(s)) => s.clone(),
        Some(_) => {
            errors.push(format!("[{}] {} must be a string", table, key));
            String::new()
        }
        None => {
            errors.push(format!("[{}] missing '{}'", table, key));
            String::new()
        }
    }
}

fn integer_at(value: &toml::Value, table: &str, key: &str, errors: &mut Vec<String>) -> i64 {
    match value.get(table).and_then(|t| t.get(key)) {
        Some(toml::Value::Integer(n)) => *n,
        Some(_) => {
            errors.push(format!("[{}] {} must be an integer", table, key));
            0
        }
        None => {
            errors.push(format!("[{}] missing '{}'", table, key));
            0
        }
    }
}

/// Longest path the selected back end stores
fn path_limit() -> usize {
    if env::var_os("CARGO_FEATURE_FS_FLASH").is_some() {
        FLASH_MAX_PATH_LEN
    } else {
        MAX_PATH_LEN
    }
}

fn path_problem(path: &str, limit: usize) -> Option<String> {
    if path.is_empty() {
        Some("is empty".to_string())
    } else if !path.starts_with('/') {
        Some("must be absolute".to_string())
    } else if path.len() > limit {
        Some(format!("is longer than {} bytes", limit))
    } else if path.len() > 1 && (path.ends_with('/') || path.contains("//")) {
        Some("has an empty segment".to_string())
    } else {
        None
    }
}

fn validate(config: &StorageToml) -> Vec<String> {
    let mut errors = Vec::new();
    let limit = path_limit();

    if let Some(problem) = path_problem(&config.canary_path, limit) {
        errors.push(format!("[canary] path {}", problem));
    }
    if config.canary_payload.is_empty() {
        errors.push("[canary] payload cannot be empty".to_string());
    }

    if config.preserved.len() > MAX_PRESERVED {
        errors.push(format!("[preserve] at most {} paths", MAX_PRESERVED));
    }
    for (i, path) in config.preserved.iter().enumerate() {
        if let Some(problem) = path_problem(path, limit) {
            errors.push(format!("[preserve] '{}' {}", path, problem));
        }
        if *path == config.canary_path {
            errors.push(format!("[preserve] '{}' is the canary path", path));
        }
        if config.preserved[..i].contains(path) {
            errors.push(format!("[preserve] '{}' listed twice", path));
        }
    }

    let (offset, size) = (config.partition_offset, config.partition_size);
    if offset % ERASE_SIZE != 0 || size % ERASE_SIZE != 0 {
        errors.push("[partition] offset and size must be 4 KiB aligned".to_string());
    }
    if size < 2 * ERASE_SIZE {
        errors.push("[partition] size must be at least 8 KiB".to_string());
    }
    if offset < 0 || offset + size > FLASH_SIZE {
        errors.push("[partition] must lie within the 2 MiB flash".to_string());
    }

    errors
}

/// Write the validated configuration as Rust constants
fn generate(config: &StorageToml) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let mut out = File::create(out_dir.join("storage_config.rs")).unwrap();

    writeln!(out, "// Generated from storage.toml").unwrap();
    writeln!(out, "pub const CANARY_PATH: &str = {:?};", config.canary_path).unwrap();
    writeln!(
        out,
        "pub const CANARY_PAYLOAD: &[u8] = &{:?};",
        config.canary_payload.as_bytes()
    )
    .unwrap();
    writeln!(out, "pub const PRESERVED: &[&str] = &{:?};", config.preserved).unwrap();
    writeln!(
        out,
        "pub const PARTITION: core::ops::Range<u32> = {}..{};",
        config.partition_offset,
        config.partition_offset + config.partition_size
    )
    .unwrap();
}

fn fail(title: &str, errors: &[String]) -> ! {
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}
