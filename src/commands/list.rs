//! List commands implementation

use rfastboot_flash::available_backends;

/// List all device backends compiled in
pub fn list_devices() {
    let backends = available_backends();
    if backends.is_empty() {
        println!("No device backends available (recompile with features)");
        return;
    }

    println!("Supported device backends:");
    println!();
    for backend in backends {
        let name = if backend.aliases.is_empty() {
            backend.name.to_string()
        } else {
            format!("{} ({})", backend.name, backend.aliases.join(", "))
        };
        println!("  {:<20} - {}", name, backend.description);
    }
}
