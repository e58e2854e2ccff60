//! Heap buffers backing bound parameters.
//!
//! The driver keeps raw pointers into these buffers between
//! `SQLBindParameter` and the execute calls that read them. Each slot owns
//! its value and indicator on the heap, so moving a slot (or the statement
//! holding it) leaves the addresses handed to the driver unchanged.

use std::collections::BTreeMap;

use super::descriptor::ParamDescriptor;
use super::indicator::Indicator;
use crate::ffi::{CDataType, NULL_DATA, ParamDirection};

#[derive(Debug)]
pub(crate) struct ParameterSlot {
    direction: ParamDirection,
    c_type: CDataType,
    descriptor: ParamDescriptor,
    value: Vec<u8>,
    indicator: Vec<isize>,
}

impl ParameterSlot {
    /// Input slot holding a copy of `encoded`, or the null indicator.
    pub(crate) fn input(
        c_type: CDataType,
        descriptor: ParamDescriptor,
        encoded: Option<&[u8]>,
    ) -> Self {
        let (value, indicator) = match encoded {
            Some(bytes) => (bytes.to_vec(), Indicator::Length(bytes.len())),
            None => (Vec::new(), Indicator::Null),
        };
        Self {
            direction: ParamDirection::Input,
            c_type,
            descriptor,
            value,
            indicator: vec![indicator.raw()],
        }
    }

    /// Output slot sized for the declared type.
    pub(crate) fn output(c_type: CDataType, descriptor: ParamDescriptor) -> Self {
        let capacity = c_type.fixed_size().unwrap_or_else(|| {
            descriptor.column_size.max(1) + usize::from(c_type.is_nul_terminated())
        });
        Self {
            direction: ParamDirection::Output,
            c_type,
            descriptor,
            value: vec![0; capacity],
            indicator: vec![NULL_DATA],
        }
    }

    pub(crate) const fn direction(&self) -> ParamDirection {
        self.direction
    }

    pub(crate) const fn c_type(&self) -> CDataType {
        self.c_type
    }

    pub(crate) const fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }

    pub(crate) fn value_ptr(&mut self) -> *mut u8 {
        self.value.as_mut_ptr()
    }

    pub(crate) fn buffer_length(&self) -> isize {
        isize::try_from(self.value.len()).unwrap_or(isize::MAX)
    }

    pub(crate) fn indicator_ptr(&mut self) -> *mut isize {
        self.indicator.as_mut_ptr()
    }

    /// Current indicator; `None` if the driver wrote an undocumented value.
    pub(crate) fn indicator(&self) -> Option<Indicator> {
        self.indicator.first().copied().and_then(Indicator::from_raw)
    }

    /// Bytes the driver delivered into an output slot, without terminator.
    pub(crate) fn delivered(&self) -> Option<&[u8]> {
        let usable = self
            .value
            .len()
            .saturating_sub(usize::from(self.c_type.is_nul_terminated()));
        match self.indicator()? {
            Indicator::Null => None,
            Indicator::NoTotal => Some(&self.value[..usable]),
            Indicator::Length(len) => Some(&self.value[..len.min(usable)]),
        }
    }
}

/// Bound parameters of one statement, keyed by 1-based position.
#[derive(Debug, Default)]
pub(crate) struct ParameterBuffers {
    slots: BTreeMap<u16, ParameterSlot>,
}

impl ParameterBuffers {
    /// Stores `slot` for `position`, releasing any buffer it replaces.
    pub(crate) fn insert(&mut self, position: u16, slot: ParameterSlot) {
        self.slots.insert(position, slot);
    }

    pub(crate) fn get(&self, position: u16) -> Option<&ParameterSlot> {
        self.slots.get(&position)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
