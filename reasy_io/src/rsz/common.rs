use std::io::{self, Read, Write};

pub const HEADER_SIZE: usize = 48;
pub const LEGACY_HEADER_SIZE: usize = 32;
pub const INSTANCE_INFO_SIZE: usize = 8;
pub const USERDATA_INFO_SIZE: usize = 24;

/// First version whose header carries a userdata table.
pub const USERDATA_MIN_VERSION: u32 = 4;

/// Section alignment inside a blob
pub const SECTION_ALIGN: usize = 16;

/// Container header. Legacy (`version < 4`) headers have no userdata fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RszHeader {
    pub magic: u32,
    pub version: u32,
    pub object_count: u32,
    pub instance_count: u32,
    pub userdata_count: u32,
    pub reserved: u32,
    pub instance_offset: u64,
    pub data_offset: u64,
    pub userdata_offset: u64,
}

impl RszHeader {
    #[inline]
    pub fn is_legacy(&self) -> bool {
        self.version < USERDATA_MIN_VERSION
    }

    #[inline]
    pub fn size(&self) -> usize {
        if self.is_legacy() {
            LEGACY_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }
}

/// Instance descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceInfo {
    pub type_id: u32,
    pub crc: u32,
}

/// Nested userdata descriptor. `rsz_offset` is relative to the start of the hosting blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserDataInfo {
    pub instance_id: u32,
    pub type_id: u32,
    pub path_hash: u32,
    pub data_size: u32,
    pub rsz_offset: u64,
}

pub(crate) fn read_exact_array<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact_array::<4, _>(reader)?))
}

pub(crate) fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    Ok(i32::from_le_bytes(read_exact_array::<4, _>(reader)?))
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact_array::<8, _>(reader)?))
}

pub fn read_header<R: Read>(reader: &mut R) -> io::Result<RszHeader> {
    let magic = read_u32(reader)?;
    let version = read_u32(reader)?;
    let object_count = read_u32(reader)?;
    let instance_count = read_u32(reader)?;

    if version < USERDATA_MIN_VERSION {
        return Ok(RszHeader {
            magic,
            version,
            object_count,
            instance_count,
            instance_offset: read_u64(reader)?,
            data_offset: read_u64(reader)?,
            ..RszHeader::default()
        });
    }

    Ok(RszHeader {
        magic,
        version,
        object_count,
        instance_count,
        userdata_count: read_u32(reader)?,
        reserved: read_u32(reader)?,
        instance_offset: read_u64(reader)?,
        data_offset: read_u64(reader)?,
        userdata_offset: read_u64(reader)?,
    })
}

pub fn write_header<W: Write>(writer: &mut W, header: &RszHeader) -> io::Result<()> {
    writer.write_all(&header.magic.to_le_bytes())?;
    writer.write_all(&header.version.to_le_bytes())?;
    writer.write_all(&header.object_count.to_le_bytes())?;
    writer.write_all(&header.instance_count.to_le_bytes())?;
    if header.is_legacy() {
        writer.write_all(&header.instance_offset.to_le_bytes())?;
        writer.write_all(&header.data_offset.to_le_bytes())?;
        return Ok(());
    }
    writer.write_all(&header.userdata_count.to_le_bytes())?;
    writer.write_all(&header.reserved.to_le_bytes())?;
    writer.write_all(&header.instance_offset.to_le_bytes())?;
    writer.write_all(&header.data_offset.to_le_bytes())?;
    writer.write_all(&header.userdata_offset.to_le_bytes())?;
    Ok(())
}

pub fn read_instance_info<R: Read>(reader: &mut R) -> io::Result<InstanceInfo> {
    Ok(InstanceInfo {
        type_id: read_u32(reader)?,
        crc: read_u32(reader)?,
    })
}

pub fn write_instance_info<W: Write>(writer: &mut W, info: &InstanceInfo) -> io::Result<()> {
    writer.write_all(&info.type_id.to_le_bytes())?;
    writer.write_all(&info.crc.to_le_bytes())?;
    Ok(())
}

pub fn read_userdata_info<R: Read>(reader: &mut R) -> io::Result<UserDataInfo> {
    Ok(UserDataInfo {
        instance_id: read_u32(reader)?,
        type_id: read_u32(reader)?,
        path_hash: read_u32(reader)?,
        data_size: read_u32(reader)?,
        rsz_offset: read_u64(reader)?,
    })
}

pub fn write_userdata_info<W: Write>(writer: &mut W, info: &UserDataInfo) -> io::Result<()> {
    writer.write_all(&info.instance_id.to_le_bytes())?;
    writer.write_all(&info.type_id.to_le_bytes())?;
    writer.write_all(&info.path_hash.to_le_bytes())?;
    writer.write_all(&info.data_size.to_le_bytes())?;
    writer.write_all(&info.rsz_offset.to_le_bytes())?;
    Ok(())
}

#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Zero-pads `out` until its length is a multiple of `align`.
#[inline]
pub(crate) fn pad_to(out: &mut Vec<u8>, align: usize) {
    let target = align_up(out.len(), align);
    out.resize(target, 0);
}
