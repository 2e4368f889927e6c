//! macOS Accessibility API and workspace wrappers for app activation

use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use accessibility::AXUIElement;
use accessibility_sys::{
    AXIsProcessTrusted, AXIsProcessTrustedWithOptions, AXUIElementSetAttributeValue,
};
use cocoa::base::{BOOL, NO, id, nil};
use cocoa::foundation::{NSAutoreleasePool, NSString};
use core_foundation::base::TCFType;
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::CFDictionary;
use core_foundation::string::CFString;
use objc::{class, msg_send, sel, sel_impl};

use crate::error::{PluckError, Result};
use crate::resolver::{RunningApp, Workspace};

/// `NSApplicationActivationPolicyRegular`: apps with a Dock icon.
const ACTIVATION_POLICY_REGULAR: isize = 0;
/// `NSApplicationActivateIgnoringOtherApps`
const ACTIVATE_IGNORING_OTHER_APPS: usize = 1 << 1;

/// Test if the Accessibility API actually works (not just permissions check)
pub fn test_api_access() -> Result<()> {
    if !has_accessibility_permissions() {
        return Err(PluckError::Accessibility(
            "Process is not trusted for Accessibility (AXIsProcessTrusted=false)".to_string(),
        ));
    }
    Ok(())
}

/// Check if the app has Accessibility permissions
pub fn has_accessibility_permissions() -> bool {
    unsafe { AXIsProcessTrusted() }
}

/// Request Accessibility permissions from the user
pub fn request_accessibility_permissions() -> bool {
    unsafe {
        let key = CFString::new("AXTrustedCheckOptionPrompt");
        let value = CFBoolean::true_value();
        let dict = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);
        AXIsProcessTrustedWithOptions(dict.as_CFTypeRef() as *const _)
    }
}

/// Copy an `NSString` into an owned `String`.
///
/// # Safety
/// `string` must be nil or a valid `NSString`.
unsafe fn from_ns_string(string: id) -> Option<String> {
    if string == nil {
        return None;
    }
    let ptr = unsafe { string.UTF8String() };
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Workspace backed by `NSWorkspace`, the Accessibility API and `open(1)`.
#[derive(Debug, Default)]
pub struct MacWorkspace;

impl MacWorkspace {
    /// Fall back to `NSRunningApplication` when the app refuses AXFrontmost.
    fn activate_running_application(&self, pid: i32) -> bool {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let app: id = msg_send![
                class!(NSRunningApplication),
                runningApplicationWithProcessIdentifier: pid
            ];
            let activated = if app == nil {
                false
            } else {
                let ok: BOOL = msg_send![app, activateWithOptions: ACTIVATE_IGNORING_OTHER_APPS];
                ok != NO
            };
            pool.drain();
            activated
        }
    }
}

impl Workspace for MacWorkspace {
    fn running_apps(&self) -> Vec<RunningApp> {
        let mut apps = Vec::new();

        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let running: id = msg_send![workspace, runningApplications];
            let count: usize = msg_send![running, count];

            for i in 0..count {
                let app: id = msg_send![running, objectAtIndex: i];
                let policy: isize = msg_send![app, activationPolicy];
                if policy != ACTIVATION_POLICY_REGULAR {
                    continue;
                }

                let pid: i32 = msg_send![app, processIdentifier];
                let name: id = msg_send![app, localizedName];
                let bundle_id: id = msg_send![app, bundleIdentifier];
                let Some(name) = from_ns_string(name) else {
                    continue;
                };

                apps.push(RunningApp {
                    pid,
                    name,
                    bundle_id: from_ns_string(bundle_id),
                });
            }

            pool.drain();
        }

        apps
    }

    fn activate(&self, app: &RunningApp) -> Result<()> {
        let app_element = AXUIElement::application(app.pid);

        let result = unsafe {
            let attr = CFString::new("AXFrontmost");
            let value = CFBoolean::true_value();

            AXUIElementSetAttributeValue(
                app_element.as_concrete_TypeRef(),
                attr.as_concrete_TypeRef(),
                value.as_CFTypeRef(),
            )
        };

        if result == 0 {
            return Ok(());
        }

        tracing::debug!(pid = app.pid, result, "AXFrontmost refused, using NSRunningApplication");
        if self.activate_running_application(app.pid) {
            Ok(())
        } else {
            Err(PluckError::Activation(format!(
                "Failed to bring {} to front: {}",
                app.name, result
            )))
        }
    }

    fn location_for_bundle_id(&self, bundle_id: &str) -> Option<PathBuf> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let identifier = NSString::alloc(nil).init_str(bundle_id);
            let url: id = msg_send![workspace, URLForApplicationWithBundleIdentifier: identifier];
            let path = if url == nil {
                None
            } else {
                let path: id = msg_send![url, path];
                from_ns_string(path).map(PathBuf::from)
            };
            let _: () = msg_send![identifier, release];
            pool.drain();
            path
        }
    }

    fn launch(&self, path: &Path) -> Result<()> {
        run_open(Command::new("open").arg(path), &path.display().to_string())
    }

    fn launch_by_name(&self, name: &str) -> Result<()> {
        run_open(Command::new("open").args(["-a", name]), name)
    }
}

fn run_open(command: &mut Command, target: &str) -> Result<()> {
    let output = command
        .output()
        .map_err(|e| PluckError::Launch(format!("Failed to run open for {}: {}", target, e)))?;

    if !output.status.success() {
        return Err(PluckError::Launch(format!(
            "open {} failed: {}",
            target,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}
