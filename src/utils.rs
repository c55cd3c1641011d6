use indicatif::ProgressStyle;

/// Progress bar shown for a whole generation run.
pub(crate) fn get_style_run() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|style| style.progress_chars("=>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Spinner shown for a single asset being generated.
pub(crate) fn get_style_asset() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Human readable message carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Asset panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Asset panicked: {s}")
    } else {
        String::from("Asset panicked with unknown payload")
    }
}
