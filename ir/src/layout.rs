use crate::context::Context;
use crate::errors::LayoutError;
use crate::types::{Type, TypeId};

/// Target facts needed to lay out types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataLayout {
    pub pointer_size: u64,
    pub pointer_align: u64,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self { pointer_size: 8, pointer_align: 8 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructLayout {
    pub size: u64,
    pub align: u64,
    pub offsets: Vec<u64>,
}

#[inline(always)]
pub const fn round_up(x: u64, align: u64) -> u64 {
    if align <= 1 {
        return x;
    }
    let m = align - 1;
    (x + m) & !m
}

fn int_layout(bits: u32) -> Layout {
    let bytes = (u64::from(bits) + 7) / 8;
    let size = bytes.max(1).next_power_of_two();
    Layout { size, align: size }
}

impl DataLayout {
    pub fn size_of(&self, ctx: &Context, ty: TypeId) -> Result<u64, LayoutError> {
        Ok(self.layout_of(ctx, ty)?.size)
    }

    pub fn align_of(&self, ctx: &Context, ty: TypeId) -> Result<u64, LayoutError> {
        Ok(self.layout_of(ctx, ty)?.align)
    }

    pub fn layout_of(&self, ctx: &Context, ty: TypeId) -> Result<Layout, LayoutError> {
        match ctx.ty(ty) {
            Type::Void => Err(LayoutError::Unsized(ctx.type_name(ty))),
            Type::Function { .. } => Err(LayoutError::Unsized(ctx.type_name(ty))),
            Type::Int(bits) => Ok(int_layout(bits)),
            Type::Float => Ok(Layout { size: 4, align: 4 }),
            Type::Double => Ok(Layout { size: 8, align: 8 }),
            Type::Pointer { .. } => Ok(Layout { size: self.pointer_size, align: self.pointer_align }),
            Type::Array { element, len } => {
                let elem = self.layout_of(ctx, element)?;
                let stride = round_up(elem.size, elem.align);
                let size = stride.checked_mul(len).ok_or(LayoutError::Overflow)?;
                Ok(Layout { size, align: elem.align })
            }
            Type::Struct(_) => {
                let sl = self.struct_layout(ctx, ty)?;
                Ok(Layout { size: sl.size, align: sl.align })
            }
        }
    }

    /// Field offsets of a struct: sequential fields padded to their
    /// alignment, total size padded to the struct alignment.
    pub fn struct_layout(&self, ctx: &Context, ty: TypeId) -> Result<StructLayout, LayoutError> {
        let Type::Struct(s) = ctx.ty(ty) else {
            return Err(LayoutError::NotAStruct(ctx.type_name(ty)));
        };
        let Some(body) = s.body else {
            return Err(LayoutError::Unsized(ctx.type_name(ty)));
        };

        let mut offsets = Vec::with_capacity(body.len());
        let mut off = 0u64;
        let mut max_align = 1u64;
        for field in body.iter() {
            let f = self.layout_of(ctx, *field)?;
            let align = if s.packed { 1 } else { f.align };
            max_align = max_align.max(align);
            off = round_up(off, align);
            offsets.push(off);
            off = off.checked_add(f.size).ok_or(LayoutError::Overflow)?;
        }
        Ok(StructLayout { size: round_up(off, max_align), align: max_align, offsets })
    }

    /// Byte offset of a constant-index element access into `ty`.
    pub fn element_offset(&self, ctx: &Context, ty: TypeId, index: u32) -> Result<u64, LayoutError> {
        match ctx.ty(ty) {
            Type::Struct(_) => {
                let sl = self.struct_layout(ctx, ty)?;
                sl.offsets
                    .get(index as usize)
                    .copied()
                    .ok_or(LayoutError::FieldOutOfRange { ty: ctx.type_name(ty), index })
            }
            Type::Array { element, .. } => {
                let elem = self.layout_of(ctx, element)?;
                Ok(round_up(elem.size, elem.align) * u64::from(index))
            }
            _ => Err(LayoutError::NotAStruct(ctx.type_name(ty))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_fields_to_their_alignment() {
        let ctx = Context::default();
        let i8t = ctx.i8_type();
        let i32t = ctx.i32_type();
        let s = ctx.struct_type(&[i8t, i32t, i8t], false);
        let sl = ctx.data_layout().struct_layout(&ctx, s).unwrap();
        assert_eq!(sl.offsets, vec![0, 4, 8]);
        assert_eq!(sl.size, 12);
        assert_eq!(sl.align, 4);
    }

    #[test]
    fn packed_structs_have_no_padding() {
        let ctx = Context::default();
        let s = ctx.struct_type(&[ctx.i8_type(), ctx.i32_type()], true);
        let sl = ctx.data_layout().struct_layout(&ctx, s).unwrap();
        assert_eq!(sl.offsets, vec![0, 1]);
        assert_eq!(sl.size, 5);
    }

    #[test]
    fn opaque_structs_are_unsized() {
        let ctx = Context::default();
        let s = ctx.opaque_struct_type("struct.Hidden");
        assert!(matches!(ctx.data_layout().layout_of(&ctx, s), Err(LayoutError::Unsized(_))));
    }
}
