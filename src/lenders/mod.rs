//! Lender adapters.
//!
//! Every supported market family implements [`LenderAdapter`]; the
//! strategy holds them as the closed [`Lender`] enum and dispatches
//! through `adapter()` / `adapter_mut()`.

pub mod base;
pub mod compound;
pub mod eth_compound;
pub mod morpho;
pub mod sonne;

pub use base::{LenderAccess, LenderAdapter, LenderBase, LenderKind, WithdrawOutcome};
pub use compound::GenericCompound;
pub use eth_compound::EthCompound;
pub use morpho::{AaveMorpho, MORPHO_REWARDS_DISTRIBUTOR};
pub use sonne::SonneFinance;

use std::fmt;

pub enum Lender {
    GenericCompound(GenericCompound),
    EthCompound(EthCompound),
    AaveMorpho(AaveMorpho),
    SonneFinance(SonneFinance),
}

impl Lender {
    pub fn adapter(&self) -> &dyn LenderAdapter {
        match self {
            Lender::GenericCompound(l) => l,
            Lender::EthCompound(l) => l,
            Lender::AaveMorpho(l) => l,
            Lender::SonneFinance(l) => l,
        }
    }

    pub fn adapter_mut(&mut self) -> &mut dyn LenderAdapter {
        match self {
            Lender::GenericCompound(l) => l,
            Lender::EthCompound(l) => l,
            Lender::AaveMorpho(l) => l,
            Lender::SonneFinance(l) => l,
        }
    }

    pub fn address(&self) -> crate::types::Address {
        self.adapter().address()
    }
}

impl fmt::Debug for Lender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adapter = self.adapter();
        f.debug_struct("Lender")
            .field("kind", &adapter.kind())
            .field("name", &adapter.lender_name())
            .field("address", &adapter.address())
            .finish()
    }
}

impl From<GenericCompound> for Lender {
    fn from(l: GenericCompound) -> Self {
        Lender::GenericCompound(l)
    }
}

impl From<EthCompound> for Lender {
    fn from(l: EthCompound) -> Self {
        Lender::EthCompound(l)
    }
}

impl From<AaveMorpho> for Lender {
    fn from(l: AaveMorpho) -> Self {
        Lender::AaveMorpho(l)
    }
}

impl From<SonneFinance> for Lender {
    fn from(l: SonneFinance) -> Self {
        Lender::SonneFinance(l)
    }
}
