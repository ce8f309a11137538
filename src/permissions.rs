use anyhow::Result;

/// Check and request Accessibility permission (for the synthetic ⌘C)
///
/// On first run macOS shows its "allow control of this computer" dialog.
///
/// # Errors
/// Returns error if Accessibility permission is not granted (macOS only)
pub fn check_accessibility_permission() -> Result<()> {
    tracing::info!("checking accessibility permission");

    #[cfg(target_os = "macos")]
    {
        use anyhow::bail;
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        if !macos::is_trusted_with_prompt() {
            bail!(
                "accessibility permission not granted\n\n\
                Enable in: System Settings → Privacy & Security → Accessibility\n\
                Add and enable this app, then restart.\n"
            );
        }

        // Trusted processes can also create HID event sources
        if CGEventSource::new(CGEventSourceStateID::HIDSystemState).is_err() {
            bail!("failed to create CGEventSource - accessibility may be restricted");
        }

        tracing::info!("accessibility permission granted");
    }

    Ok(())
}

/// Check all required permissions, warning instead of failing
///
/// Without permission every capture comes back empty, which the pipeline
/// already reports as "nothing selected".
pub fn warn_missing_permissions() -> bool {
    match check_accessibility_permission() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "selection capture will not work until permission is granted"
            );
            false
        }
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::string::CFString;

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrustedWithOptions(options: core_foundation::base::CFTypeRef) -> bool;
    }

    /// Ask whether this process is trusted, prompting the user if it is not
    pub fn is_trusted_with_prompt() -> bool {
        let key = CFString::new("AXTrustedCheckOptionPrompt");
        let value = CFBoolean::true_value();
        let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);

        #[allow(unsafe_code)]
        // SAFETY: `options` is a valid CFDictionary that outlives the call
        unsafe {
            AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef().cast())
        }
    }
}
