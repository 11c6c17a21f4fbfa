//! Module loader backed by host-defined script files.
//!
//! Script files registered through `define_script_file` are served from an
//! in-memory map under a synthetic `jshost:` scheme; anything else resolves
//! against the working directory set at engine start and is read from disk.

use deno_core::{
    ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier, ModuleType,
    RequestedModuleType,
};
use deno_error::JsErrorBox;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

const DEFINED_SCHEME_BASE: &str = "jshost://scripts/";

pub(crate) struct ScriptFileLoader {
    defined: RefCell<HashMap<String, String>>,
    working_directory: RefCell<Option<PathBuf>>,
}

impl ScriptFileLoader {
    pub(crate) fn new() -> Self {
        Self {
            defined: RefCell::new(HashMap::new()),
            working_directory: RefCell::new(None),
        }
    }

    /// Register (or replace) a named script file.
    pub(crate) fn define(&self, name: String, source: String) {
        log::trace!("defining script file \"{}\"", name);
        self.defined.borrow_mut().insert(name, source);
    }

    /// Set the base directory for on-disk module resolution.
    pub(crate) fn set_working_directory(&self, directory: PathBuf) {
        *self.working_directory.borrow_mut() = Some(directory);
    }
}

impl ModuleLoader for ScriptFileLoader {
    fn resolve(
        &self,
        specifier: &str,
        _referrer: &str,
        _kind: deno_core::ResolutionKind,
    ) -> Result<deno_core::url::Url, deno_core::error::ModuleLoaderError> {
        let bare = specifier
            .strip_prefix(DEFINED_SCHEME_BASE)
            .unwrap_or(specifier);

        if self.defined.borrow().contains_key(bare) {
            let defined = format!("{}{}", DEFINED_SCHEME_BASE, bare);
            return ModuleSpecifier::parse(&defined)
                .map_err(|e| JsErrorBox::new("URIError", e.to_string()).into());
        }

        // Not a defined script file; resolve against the working directory.
        if let Some(directory) = self.working_directory.borrow().as_ref() {
            return deno_core::resolve_path(bare, directory).map_err(|e| {
                JsErrorBox::new(
                    "Error",
                    format!("failed to resolve module `{}`: {}", specifier, e),
                )
                .into()
            });
        }

        Err(JsErrorBox::new(
            "Error",
            format!(
                "module `{}` is not a defined script file and the engine has no working directory",
                specifier
            ),
        )
        .into())
    }

    fn load(
        &self,
        module_specifier: &deno_core::url::Url,
        _maybe_referrer: Option<&deno_core::url::Url>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        let specifier = module_specifier.as_str();

        if let Some(name) = specifier.strip_prefix(DEFINED_SCHEME_BASE) {
            return match self.defined.borrow().get(name) {
                Some(source) => ModuleLoadResponse::Sync(Ok(ModuleSource::new(
                    ModuleType::JavaScript,
                    ModuleSourceCode::String(source.clone().into()),
                    module_specifier,
                    None,
                ))),
                None => ModuleLoadResponse::Sync(Err(JsErrorBox::new(
                    "Error",
                    format!("script file `{}` is not defined", name),
                )
                .into())),
            };
        }

        if module_specifier.scheme() == "file" {
            let path = match module_specifier.to_file_path() {
                Ok(path) => path,
                Err(()) => {
                    return ModuleLoadResponse::Sync(Err(JsErrorBox::new(
                        "Error",
                        format!("invalid file module specifier `{}`", specifier),
                    )
                    .into()))
                }
            };
            return match std::fs::read_to_string(&path) {
                Ok(source) => ModuleLoadResponse::Sync(Ok(ModuleSource::new(
                    ModuleType::JavaScript,
                    ModuleSourceCode::String(source.into()),
                    module_specifier,
                    None,
                ))),
                Err(err) => ModuleLoadResponse::Sync(Err(JsErrorBox::new(
                    "Error",
                    format!("failed to read module `{}`: {}", path.display(), err),
                )
                .into())),
            };
        }

        ModuleLoadResponse::Sync(Err(JsErrorBox::new(
            "Error",
            format!("unsupported module scheme in `{}`", specifier),
        )
        .into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deno_core::ResolutionKind;

    #[test]
    fn test_defined_script_resolves_to_synthetic_scheme() {
        let loader = ScriptFileLoader::new();
        loader.define("util.js".to_string(), "export const x = 1;".to_string());

        let url = loader
            .resolve("util.js", "main.js", ResolutionKind::Import)
            .unwrap();
        assert_eq!(url.as_str(), "jshost://scripts/util.js");
    }

    #[test]
    fn test_unknown_module_without_working_directory_is_denied() {
        let loader = ScriptFileLoader::new();
        assert!(loader
            .resolve("missing.js", "main.js", ResolutionKind::Import)
            .is_err());
    }

    #[test]
    fn test_unknown_module_resolves_against_working_directory() {
        let loader = ScriptFileLoader::new();
        loader.set_working_directory(std::env::temp_dir());

        let url = loader
            .resolve("on_disk.js", "main.js", ResolutionKind::Import)
            .unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("on_disk.js"));
    }

    #[test]
    fn test_redefining_a_script_replaces_its_source() {
        let loader = ScriptFileLoader::new();
        loader.define("util.js".to_string(), "export const x = 1;".to_string());
        loader.define("util.js".to_string(), "export const x = 2;".to_string());

        assert_eq!(
            loader.defined.borrow().get("util.js").unwrap(),
            "export const x = 2;"
        );
    }
}
