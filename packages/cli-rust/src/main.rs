//! z2p-image CLI - Build the zer02prod container image
//!
//! This is the main entry point for the Rust CLI binary.

fn main() {
    let code = match zer02prod_image::run() {
        Ok(code) => code,
        Err(err) => {
            zer02prod_image::report_error(&err);
            zer02prod_image::exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
