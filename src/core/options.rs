//! Compiler configuration.

use super::error::{CompileError, CompileResult};

/// Temp registers available to the allocator.
pub const DEFAULT_NUM_TEMPS: u32 = 248;

/// Instruction cache alignment in bytes.
pub const DEFAULT_ICACHE_ALIGN: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub num_temps: u32,
    pub icache_align: u32,
    /// Upper bound on optimizer + DCE rounds.
    pub opt_rounds: u32,
    /// Run the optimizer and DCE at all.
    pub optimize: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            num_temps: DEFAULT_NUM_TEMPS,
            icache_align: DEFAULT_ICACHE_ALIGN,
            opt_rounds: 1,
            optimize: true,
        }
    }
}

impl Options {
    pub fn with_num_temps(mut self, num_temps: u32) -> Self {
        self.num_temps = num_temps;
        self
    }

    pub fn with_icache_align(mut self, icache_align: u32) -> Self {
        self.icache_align = icache_align;
        self
    }

    pub fn with_opt_rounds(mut self, opt_rounds: u32) -> Self {
        self.opt_rounds = opt_rounds;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn validate(&self) -> CompileResult<()> {
        if self.num_temps == 0 {
            return Err(CompileError::InvalidOptions {
                reason: "at least one temp register is required".to_string(),
            });
        }
        // Groups are padded in 16-bit words, so the alignment must be too.
        if self.icache_align < 2 || !self.icache_align.is_power_of_two() {
            return Err(CompileError::InvalidOptions {
                reason: format!(
                    "icache alignment {} is not an even power of two",
                    self.icache_align
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_alignment() {
        assert!(Options::default().with_icache_align(6).validate().is_err());
        assert!(Options::default().with_icache_align(1).validate().is_err());
        assert!(Options::default().with_icache_align(16).validate().is_ok());
        assert!(Options::default().with_num_temps(0).validate().is_err());
    }
}
