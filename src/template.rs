//! Template rendering to local files.

use log::debug;
use minijinja::Environment;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse template {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render template {}: {source}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Renders a template file with data into an output file.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template: &Path,
        output: &Path,
        data: &serde_json::Value,
    ) -> Result<(), TemplateError>;
}

/// Jinja-syntax renderer (`{{ name }}`, `{% for b in backends %}`).
///
/// Output is written to a temporary sibling and renamed into place, so
/// hosts rendering the same template concurrently never read a partial
/// file.
#[derive(Debug, Default, Clone, Copy)]
pub struct MiniJinjaRenderer;

static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(
        &self,
        template: &Path,
        output: &Path,
        data: &serde_json::Value,
    ) -> Result<(), TemplateError> {
        let source = fs::read_to_string(template).map_err(|source| TemplateError::NotFound {
            path: template.to_path_buf(),
            source,
        })?;

        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        let compiled = env
            .template_from_str(&source)
            .map_err(|source| TemplateError::Parse {
                path: template.to_path_buf(),
                source,
            })?;
        let rendered = compiled.render(data).map_err(|source| TemplateError::Render {
            path: template.to_path_buf(),
            source,
        })?;

        write_atomic(output, rendered.as_bytes()).map_err(|source| TemplateError::Unwritable {
            path: output.to_path_buf(),
            source,
        })?;
        debug!("rendered {} -> {}", template.display(), output.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output has no file name"))?;
    let mut staged = name.to_os_string();
    staged.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));
    let staged = path.with_file_name(staged);

    fs::write(&staged, contents).and_then(|()| fs::rename(&staged, path)).inspect_err(|_| {
        let _ = fs::remove_file(&staged);
    })
}
