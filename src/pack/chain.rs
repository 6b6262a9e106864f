use std::collections::HashSet;

use crate::delta;
use crate::error::{OdbError, Result};
use crate::id::ObjectType;
use crate::pack::file::{Delta, PackFile, RawObjectHeader};
use crate::pack::index::FindOffset;

const MAX_CHAIN_DEPTH: usize = 50;

/// The standard object a delta chain ultimately rests on.
pub struct ResolvedBase {
    pub ty: ObjectType,
    pub offset: u64,
}

/// A fully-walked delta chain: every link from the tip down to a
/// standard base, in tip-first order.
pub struct DeltaChain {
    links: Vec<Delta>,
    base: ResolvedBase,
}

impl DeltaChain {
    pub fn depth(&self) -> usize {
        self.links.len()
    }
}

/// Walks back from a tip delta (whose raw header has already been read
/// by the caller, at `tip_offset`) through OFS/REF links until a
/// standard object is reached.
///
/// `resolver` is the narrow `{find_offset}` capability a `PackIndex`
/// provides — kept as a trait object so this walk can be tested
/// against an in-memory fake instead of a real `.idx` file.
pub fn resolve_chain(
    pack: &PackFile,
    resolver: &dyn FindOffset,
    tip_offset: u64,
    tip_header: RawObjectHeader,
) -> Result<DeltaChain> {
    let mut links = Vec::new();
    let mut visited = HashSet::new();
    let mut current_offset = tip_offset;
    let mut current_header = tip_header;

    loop {
        if links.len() >= MAX_CHAIN_DEPTH {
            return Err(OdbError::DeltaTooDeep(MAX_CHAIN_DEPTH));
        }
        if !visited.insert(current_offset) {
            return Err(OdbError::DeltaCycle);
        }

        let delta = pack.read_delta_envelope(current_header, current_offset)?;
        let base_offset = match &delta {
            Delta::Ofs { base_offset, .. } => {
                if *base_offset >= current_offset {
                    return Err(OdbError::DeltaCycle);
                }
                *base_offset
            }
            Delta::Ref { base_id, .. } => resolver.find_offset(base_id)?,
        };

        links.push(delta);

        let header = pack.read_raw_header(base_offset)?;
        let ty = ObjectType::from_type_id(header.type_id)?;

        if ty.is_standard() {
            log::debug!(
                "resolved delta chain of depth {} ending in a {}",
                links.len(),
                ty.name()
            );
            return Ok(DeltaChain {
                links,
                base: ResolvedBase {
                    ty,
                    offset: base_offset,
                },
            });
        }
        if !ty.is_delta() {
            return Err(OdbError::UnexpectedBaseType(format!(
                "object type code {}",
                header.type_id
            )));
        }

        current_offset = base_offset;
        current_header = header;
    }
}

/// Inflates the resolved base and applies every link, tip-ward, to
/// reconstruct the tip's bytes.
///
/// Two growable buffers are swapped between links rather than
/// reallocating on every application, which matters for long chains
/// over large blobs.
pub fn apply_chain(pack: &PackFile, chain: &DeltaChain) -> Result<(ObjectType, Vec<u8>)> {
    let base_header = pack.read_raw_header(chain.base.offset)?;
    let mut a = pack.inflate_at(base_header.payload_offset, base_header.size)?;
    let mut b = Vec::new();

    for link in chain.links.iter().rev() {
        let instructions = pack.inflate_at(link.offset(), link.size())?;
        b.clear();
        let mut decoder = delta::DeltaDecoder::new(&instructions)?;
        decoder.patch(&a, &mut b)?;
        std::mem::swap(&mut a, &mut b);
    }

    Ok((chain.base.ty, a))
}
