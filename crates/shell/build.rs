//! Build script for the overlay shell
//! Embeds Windows resource metadata (name shown in Task Manager)

fn main() {
    #[cfg(windows)]
    {
        let mut res = winresource::WindowsResource::new();
        res.set("FileDescription", "Overlay Shell");
        res.set("ProductName", "Overlay Shell");
        res.set("InternalName", "overlay-shell");
        res.set("OriginalFilename", "overlay-shell.exe");
        res.set("ProductVersion", env!("CARGO_PKG_VERSION"));
        res.set("FileVersion", env!("CARGO_PKG_VERSION"));

        if let Err(e) = res.compile() {
            println!("cargo:warning=Failed to compile Windows resources: {}", e);
        }
    }
}
