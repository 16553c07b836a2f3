use crate::cursor::Cursor;
use crate::error::ClassFileError;

pub(crate) const CONSTANT_UTF8: u8 = 1;
pub(crate) const CONSTANT_INTEGER: u8 = 3;
pub(crate) const CONSTANT_FLOAT: u8 = 4;
pub(crate) const CONSTANT_LONG: u8 = 5;
pub(crate) const CONSTANT_DOUBLE: u8 = 6;
pub(crate) const CONSTANT_CLASS: u8 = 7;
pub(crate) const CONSTANT_STRING: u8 = 8;
pub(crate) const CONSTANT_FIELDREF: u8 = 9;
pub(crate) const CONSTANT_METHODREF: u8 = 10;
pub(crate) const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub(crate) const CONSTANT_NAME_AND_TYPE: u8 = 12;
pub(crate) const CONSTANT_METHOD_HANDLE: u8 = 15;
pub(crate) const CONSTANT_METHOD_TYPE: u8 = 16;
pub(crate) const CONSTANT_DYNAMIC: u8 = 17;
pub(crate) const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
pub(crate) const CONSTANT_MODULE: u8 = 19;
pub(crate) const CONSTANT_PACKAGE: u8 = 20;

/// One constant pool slot. References to other slots are kept as raw indices
/// and resolved on access, so forward references need no fix-up pass.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Constant {
    /// Slot 0 and the slot following a long or double.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

impl Constant {
    pub(crate) fn tag(&self) -> Option<u8> {
        let tag = match self {
            Constant::Unusable => return None,
            Constant::Utf8(_) => CONSTANT_UTF8,
            Constant::Integer(_) => CONSTANT_INTEGER,
            Constant::Float(_) => CONSTANT_FLOAT,
            Constant::Long(_) => CONSTANT_LONG,
            Constant::Double(_) => CONSTANT_DOUBLE,
            Constant::Class { .. } => CONSTANT_CLASS,
            Constant::String { .. } => CONSTANT_STRING,
            Constant::FieldRef { .. } => CONSTANT_FIELDREF,
            Constant::MethodRef { .. } => CONSTANT_METHODREF,
            Constant::InterfaceMethodRef { .. } => CONSTANT_INTERFACE_METHODREF,
            Constant::NameAndType { .. } => CONSTANT_NAME_AND_TYPE,
            Constant::MethodHandle { .. } => CONSTANT_METHOD_HANDLE,
            Constant::MethodType { .. } => CONSTANT_METHOD_TYPE,
            Constant::Dynamic { .. } => CONSTANT_DYNAMIC,
            Constant::InvokeDynamic { .. } => CONSTANT_INVOKE_DYNAMIC,
            Constant::Module { .. } => CONSTANT_MODULE,
            Constant::Package { .. } => CONSTANT_PACKAGE,
        };
        Some(tag)
    }
}

/// Constant pool of one class file, indexed from 1.
#[derive(Debug)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(cursor: &mut Cursor<'_>) -> Result<Self, ClassFileError> {
        let count = cursor.u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);
        while entries.len() < count {
            let index = entries.len();
            let tag = cursor.u1()?;
            let constant = match tag {
                CONSTANT_UTF8 => {
                    let len = cursor.u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(cursor.bytes(len)?)?)
                }
                CONSTANT_INTEGER => Constant::Integer(cursor.i4()?),
                CONSTANT_FLOAT => Constant::Float(f32::from_bits(cursor.u4()?)),
                CONSTANT_LONG => Constant::Long(cursor.u8()? as i64),
                CONSTANT_DOUBLE => Constant::Double(f64::from_bits(cursor.u8()?)),
                CONSTANT_CLASS => Constant::Class {
                    name_index: cursor.u2()?,
                },
                CONSTANT_STRING => Constant::String {
                    string_index: cursor.u2()?,
                },
                CONSTANT_FIELDREF => Constant::FieldRef {
                    class_index: cursor.u2()?,
                    name_and_type_index: cursor.u2()?,
                },
                CONSTANT_METHODREF => Constant::MethodRef {
                    class_index: cursor.u2()?,
                    name_and_type_index: cursor.u2()?,
                },
                CONSTANT_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                    class_index: cursor.u2()?,
                    name_and_type_index: cursor.u2()?,
                },
                CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
                    name_index: cursor.u2()?,
                    descriptor_index: cursor.u2()?,
                },
                CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
                    kind: cursor.u1()?,
                    reference_index: cursor.u2()?,
                },
                CONSTANT_METHOD_TYPE => Constant::MethodType {
                    descriptor_index: cursor.u2()?,
                },
                CONSTANT_DYNAMIC => Constant::Dynamic {
                    bootstrap_index: cursor.u2()?,
                    name_and_type_index: cursor.u2()?,
                },
                CONSTANT_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_index: cursor.u2()?,
                    name_and_type_index: cursor.u2()?,
                },
                CONSTANT_MODULE => Constant::Module {
                    name_index: cursor.u2()?,
                },
                CONSTANT_PACKAGE => Constant::Package {
                    name_index: cursor.u2()?,
                },
                _ => return Err(ClassFileError::UnsupportedConstantTag { tag, index }),
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                if entries.len() == count {
                    return Err(ClassFileError::malformed(format!(
                        "8-byte constant at index {index} overruns a pool of {count} slots"
                    )));
                }
                entries.push(Constant::Unusable);
            }
        }
        Ok(Self { entries })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Indexed entries, skipping unusable slots.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(index, constant)| (index as u16, constant))
    }

    pub(crate) fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::malformed(format!(
                "invalid constant pool index {index}"
            ))),
            Some(constant) => Ok(constant),
        }
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(unexpected(index, "Utf8", other)),
        }
    }

    /// Internal name held by a `Class` entry.
    pub(crate) fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(unexpected(index, "Class", other)),
        }
    }

    /// Like [`class_name`](Self::class_name) but index 0 means absent.
    pub(crate) fn optional_class_name(&self, index: u16) -> Result<Option<&str>, ClassFileError> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    pub(crate) fn string(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::String { string_index } => self.utf8(*string_index),
            other => Err(unexpected(index, "String", other)),
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFileError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(unexpected(index, "NameAndType", other)),
        }
    }

    /// Owner, name and descriptor of a field or method reference.
    pub(crate) fn member_ref(&self, index: u16) -> Result<(&str, &str, &str), ClassFileError> {
        match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok((self.class_name(*class_index)?, name, descriptor))
            }
            other => Err(unexpected(index, "member reference", other)),
        }
    }

    /// Index of the `Methodref` naming exactly this owner, name and descriptor.
    pub(crate) fn find_method_ref(&self, owner: &str, name: &str, descriptor: &str) -> Option<u16> {
        self.iter().find_map(|(index, constant)| match constant {
            Constant::MethodRef { .. } => match self.member_ref(index) {
                Ok((o, n, d)) if o == owner && n == name && d == descriptor => Some(index),
                _ => None,
            },
            _ => None,
        })
    }
}

fn unexpected(index: u16, expected: &str, found: &Constant) -> ClassFileError {
    ClassFileError::malformed(format!(
        "constant pool index {index} is not {expected} (tag {:?})",
        found.tag()
    ))
}

/// Decodes the modified UTF-8 encoding used by class files.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String, ClassFileError> {
    if let Ok(plain) = std::str::from_utf8(bytes) {
        if !plain.contains('\0') {
            return Ok(plain.to_string());
        }
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut index = 0;
    let invalid = |at: usize| ClassFileError::malformed(format!("invalid modified UTF-8 at byte {at}"));
    while index < bytes.len() {
        let first = bytes[index];
        if first & 0x80 == 0 {
            units.push(first as u16);
            index += 1;
        } else if first & 0xe0 == 0xc0 {
            let second = *bytes.get(index + 1).ok_or_else(|| invalid(index))?;
            if second & 0xc0 != 0x80 {
                return Err(invalid(index));
            }
            units.push((((first & 0x1f) as u16) << 6) | (second & 0x3f) as u16);
            index += 2;
        } else if first & 0xf0 == 0xe0 {
            let second = *bytes.get(index + 1).ok_or_else(|| invalid(index))?;
            let third = *bytes.get(index + 2).ok_or_else(|| invalid(index))?;
            if second & 0xc0 != 0x80 || third & 0xc0 != 0x80 {
                return Err(invalid(index));
            }
            units.push(
                (((first & 0x0f) as u16) << 12)
                    | (((second & 0x3f) as u16) << 6)
                    | (third & 0x3f) as u16,
            );
            index += 3;
        } else {
            return Err(invalid(index));
        }
    }
    Ok(String::from_utf16_lossy(&units))
}
