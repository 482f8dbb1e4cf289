//! The ISA assembler seam
//!
//! The actual Gen ISA assembler/disassembler is an external collaborator;
//! the pipelines talk to it through [`GenAssembler`] and degrade to raw
//! byte copies when it cannot service a request.

use tracing::warn;

/// External ISA assembler interface
pub trait GenAssembler {
    /// Assembles ISA text into kernel heap bytes, `None` on failure
    fn try_assemble(&self, src: &str) -> Option<Vec<u8>>;
    /// Disassembles kernel heap bytes into ISA text, `None` on failure
    fn try_disassemble(&self, bytes: &[u8]) -> Option<String>;
    /// Selects the gfx core family (as found in the program header)
    fn set_gfx_core(&mut self, core: u32);
    /// Selects a product family by device name; [false] for unknown names
    fn set_product_family(&mut self, device: &str) -> bool;
    /// Returns [true] once a product family has been selected
    fn is_known_platform(&self) -> bool;
}

// device name -> gfx core family
const PRODUCT_FAMILIES: &[(&str, u32)] = &[
    ("bdw", 8),
    ("skl", 9),
    ("kbl", 9),
    ("cfl", 9),
    ("bxt", 9),
    ("glk", 9),
    ("icllp", 11),
    ("lkf", 11),
    ("ehl", 11),
    ("tgllp", 12),
    ("rkl", 12),
    ("dg1", 12),
];

/// Stand-in assembler used when no ISA backend is linked in
///
/// Keeps track of the requested platform so the pipelines can report it,
/// but never assembles nor disassembles anything; kernel heaps then travel
/// as verbatim byte copies.
#[derive(Default)]
pub struct IgaStub {
    gfx_core: Option<u32>,
    product: Option<String>,
}

impl IgaStub {
    /// Creates a stub with no platform selected
    pub fn new() -> Self {
        Self::default()
    }
}

impl GenAssembler for IgaStub {
    fn try_assemble(&self, _src: &str) -> Option<Vec<u8>> {
        None
    }

    fn try_disassemble(&self, _bytes: &[u8]) -> Option<String> {
        None
    }

    fn set_gfx_core(&mut self, core: u32) {
        self.gfx_core = Some(core);
    }

    fn set_product_family(&mut self, device: &str) -> bool {
        match PRODUCT_FAMILIES.iter().find(|(name, _)| *name == device) {
            Some((name, core)) => {
                self.product = Some((*name).to_string());
                self.gfx_core = Some(*core);
                true
            }
            None => {
                warn!("Unknown device {}", device);
                false
            }
        }
    }

    fn is_known_platform(&self) -> bool {
        self.product.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stub_platform_tracking() {
        let mut iga = IgaStub::new();
        assert!(!iga.is_known_platform());
        assert!(!iga.set_product_family("rasputin"));
        assert!(!iga.is_known_platform());
        assert!(iga.set_product_family("skl"));
        assert!(iga.is_known_platform());
        assert!(iga.try_assemble("mov (8|M0) r2.0<1>:f r1.0<8;8,1>:f").is_none());
        assert!(iga.try_disassemble(&[0u8; 16]).is_none());
    }
}
