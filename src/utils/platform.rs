/// Running OS name as reported by the standard library ("linux", "windows", ...)
pub fn current_os_name() -> &'static str {
    std::env::consts::OS
}

/// True for any Windows-family OS name ("Windows 10", "windows", "WINDOWS SERVER").
pub fn is_windows_os(os_name: &str) -> bool {
    let squashed: String = os_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    squashed.contains("windows")
}

/// Whether the drivers installer is offered on this machine
pub fn drivers_offered() -> bool {
    is_windows_os(current_os_name())
}
