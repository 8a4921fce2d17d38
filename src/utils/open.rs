use std::process::Command;

/// Open a URL in the user's default web browser
pub fn open_url(url: &str) {
    #[cfg(target_os = "linux")]
    {
        if Command::new("xdg-open").arg(url).spawn().is_err() {
            let _ = Command::new("gio").args(["open", url]).spawn();
        }
    }
    #[cfg(target_os = "macos")]
    {
        let _ = Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "windows")]
    {
        // Use cmd /C start to delegate to shell and default browser
        let _ = Command::new("cmd").args(["/C", "start", "", url]).spawn();
    }
}
