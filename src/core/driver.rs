//! Build mode for production/development builds.

/// Build mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildMode {
    /// Keep serving and rebuild on change. Injects the client runtime.
    pub watch: bool,

    /// Minify scripts, stylesheets and documents.
    pub minify: bool,

    /// Inline critical CSS into written documents.
    pub critical: bool,
}

impl BuildMode {
    /// Production mode: minified output, no client runtime.
    pub const PRODUCTION: Self = Self {
        watch: false,
        minify: true,
        critical: false,
    };

    /// Development mode: readable output with hot reload support.
    pub const DEVELOPMENT: Self = Self {
        watch: true,
        minify: false,
        critical: false,
    };

    /// Select the mode for a run from the command-line switches.
    ///
    /// Critical CSS is a production concern and is ignored in watch mode.
    pub const fn from_flags(watch: bool, critical: bool) -> Self {
        let base = if watch { Self::DEVELOPMENT } else { Self::PRODUCTION };
        Self {
            critical: critical && !watch,
            ..base
        }
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        Self::PRODUCTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(BuildMode::from_flags(false, false), BuildMode::PRODUCTION);
        assert!(BuildMode::from_flags(false, true).critical);
        assert!(!BuildMode::from_flags(true, true).critical);
        assert!(!BuildMode::from_flags(true, false).minify);
    }
}
