// Font asset lookup by script

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::RenderingConfig;
use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::Script;

const LOADED_FONT_CAPACITY: usize = 8;

/// Raw font file bytes for one script.
#[derive(Clone)]
pub struct FontAsset {
    pub script: Script,
    /// Stable identifier (file path or registration name)
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

impl fmt::Debug for FontAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontAsset")
            .field("script", &self.script)
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// TrueType, OpenType and collection signatures.
fn looks_like_font(data: &[u8]) -> bool {
    matches!(
        data.get(..4),
        Some([0x00, 0x01, 0x00, 0x00]) | Some(b"OTTO") | Some(b"true") | Some(b"ttcf")
    )
}

/// Resolves `script -> font` from configuration, reading each file once.
///
/// A script with no configured font, or whose file is missing, has no font;
/// there is no substitution across scripts.
pub struct FontRegistry {
    font_dir: PathBuf,
    paths: HashMap<Script, PathBuf>,
    registered: RwLock<HashMap<Script, FontAsset>>,
    loaded: Mutex<LruCache<Script, FontAsset>>,
}

impl FontRegistry {
    pub fn new(font_dir: impl Into<PathBuf>, paths: HashMap<Script, PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(LOADED_FONT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            font_dir: font_dir.into(),
            paths,
            registered: RwLock::new(HashMap::new()),
            loaded: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &RenderingConfig) -> Self {
        let registry = Self::new(config.font_dir.clone(), config.fonts.clone());
        for (script, path) in &registry.paths {
            let resolved = registry.resolve(path);
            if resolved.exists() {
                debug!("✓ Font for {}: {}", script, resolved.display());
            } else {
                info!("⚠ Font for {} not found ({})", script, resolved.display());
            }
        }
        registry
    }

    /// Register in-memory font bytes for `script`, taking precedence over
    /// the configured file.
    pub fn register_bytes(&self, script: Script, name: impl Into<String>, data: Vec<u8>) -> RenderingResult<()> {
        let name = name.into();
        if !looks_like_font(&data) {
            return Err(RenderingError::FontLoadError(format!("{} is not a TrueType/OpenType font", name)));
        }
        self.registered.write().insert(
            script,
            FontAsset {
                script,
                name,
                data: Arc::new(data),
            },
        );
        Ok(())
    }

    /// Configured path, falling back to `font_dir/<path>` for relative paths
    /// that do not exist as given.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let in_dir = self.font_dir.join(path);
        if in_dir.exists() {
            return in_dir;
        }
        match path.file_name() {
            Some(file) if self.font_dir.join(file).exists() => self.font_dir.join(file),
            _ => path.to_path_buf(),
        }
    }

    /// Whether `font_for(script)` would succeed without reading the file.
    pub fn is_available(&self, script: Script) -> bool {
        self.registered.read().contains_key(&script)
            || self.loaded.lock().contains(&script)
            || self.paths.get(&script).is_some_and(|p| self.resolve(p).exists())
    }

    /// The font for `script`, or `FontMissing`.
    pub fn font_for(&self, script: Script) -> RenderingResult<FontAsset> {
        if let Some(asset) = self.registered.read().get(&script) {
            return Ok(asset.clone());
        }
        if let Some(asset) = self.loaded.lock().get(&script) {
            return Ok(asset.clone());
        }

        let path = self.paths.get(&script).ok_or(RenderingError::FontMissing { script, path: None })?;
        let resolved = self.resolve(path);
        let data = std::fs::read(&resolved).map_err(|e| {
            warn!("Font for {} unreadable at {}: {}", script, resolved.display(), e);
            RenderingError::FontMissing {
                script,
                path: Some(resolved.display().to_string()),
            }
        })?;

        if !looks_like_font(&data) {
            return Err(RenderingError::FontLoadError(format!(
                "{} is not a TrueType/OpenType font",
                resolved.display()
            )));
        }

        let asset = FontAsset {
            script,
            name: resolved.display().to_string(),
            data: Arc::new(data),
        };
        self.loaded.lock().put(script, asset.clone());
        info!("Loaded {} font from {}", script, resolved.display());
        Ok(asset)
    }
}
