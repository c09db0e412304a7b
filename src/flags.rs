/*
 * Static decoder for the on-disk layout of PE images.
 * 
 * The MIT License (MIT)
 * 
 * Copyright (c) 2015 athre0z
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 * 
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 * 
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Characteristic bitmasks and symbolic code lookups.
//!
//! Unknown codes are data, not errors: lookups fall back to an
//! `Unrecognized` variant carrying the raw value.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// COFF header `Characteristics`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CoffCharacteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const AGGRESSIVE_WS_TRIM = 0x0010;
        const LARGE_ADDRESS_AWARE = 0x0020;
        const BYTES_REVERSED_LO = 0x0080;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        const NET_RUN_FROM_SWAP = 0x0800;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
        const BYTES_REVERSED_HI = 0x8000;
    }
}

bitflags! {
    /// Optional header `DllCharacteristics`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DllCharacteristics: u16 {
        /// Reserved, must be zero.
        const RESERVED_0001 = 0x0001;
        const RESERVED_0002 = 0x0002;
        const RESERVED_0004 = 0x0004;
        const RESERVED_0008 = 0x0008;
        const HIGH_ENTROPY_VA = 0x0020;
        const DYNAMIC_BASE = 0x0040;
        const FORCE_INTEGRITY = 0x0080;
        const NX_COMPAT = 0x0100;
        const NO_ISOLATION = 0x0200;
        const NO_SEH = 0x0400;
        const NO_BIND = 0x0800;
        const APPCONTAINER = 0x1000;
        const WDM_DRIVER = 0x2000;
        const GUARD_CF = 0x4000;
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

bitflags! {
    /// Section header `Characteristics`.
    ///
    /// The `IMAGE_SCN_ALIGN_*` nibble is a packed value, not a set of
    /// flags, so it is not listed here.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SectionCharacteristics: u32 {
        const TYPE_NO_PAD = 0x0000_0008;
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const LNK_OTHER = 0x0000_0100;
        const LNK_INFO = 0x0000_0200;
        const LNK_REMOVE = 0x0000_0800;
        const LNK_COMDAT = 0x0000_1000;
        const GPREL = 0x0000_8000;
        const LNK_NRELOC_OVFL = 0x0100_0000;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

/// Defines a code-to-name enum with an `Unrecognized(code)` fallback.
macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )*
            /// A code with no known mapping.
            Unrecognized($repr),
        }

        impl $name {
            pub fn from_code(code: $repr) -> $name {
                match code {
                    $( $code => $name::$variant, )*
                    other => $name::Unrecognized(other),
                }
            }

            pub fn code(self) -> $repr {
                match self {
                    $( $name::$variant => $code, )*
                    $name::Unrecognized(other) => other,
                }
            }

            pub fn is_recognized(self) -> bool {
                !matches!(self, $name::Unrecognized(_))
            }
        }

        impl From<$repr> for $name {
            fn from(code: $repr) -> $name {
                $name::from_code(code)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( $name::$variant => f.write_str(stringify!($variant)), )*
                    $name::Unrecognized(other) => write!(f, "unrecognized code {}", other),
                }
            }
        }
    };
}

code_enum! {
    /// COFF header `Machine`.
    pub enum MachineType: u16 {
        /// Applicable to any machine type.
        Any = 0x0000,
        Alpha = 0x0184,
        Alpha64 = 0x0284,
        Am33 = 0x01D3,
        Amd64 = 0x8664,
        Arm = 0x01C0,
        Arm64 = 0xAA64,
        Arm64Ec = 0xA641,
        Arm64X = 0xA64E,
        ArmNt = 0x01C4,
        Ebc = 0x0EBC,
        I386 = 0x014C,
        Ia64 = 0x0200,
        LoongArch32 = 0x6232,
        LoongArch64 = 0x6264,
        M32R = 0x9041,
        Mips16 = 0x0266,
        MipsFpu = 0x0366,
        MipsFpu16 = 0x0466,
        PowerPc = 0x01F0,
        PowerPcFp = 0x01F1,
        R4000 = 0x0166,
        RiscV32 = 0x5032,
        RiscV64 = 0x5064,
        RiscV128 = 0x5128,
        Sh3 = 0x01A2,
        Sh3Dsp = 0x01A3,
        Sh4 = 0x01A6,
        Sh5 = 0x01A8,
        Thumb = 0x01C2,
        WceMipsV2 = 0x0169,
    }
}

code_enum! {
    /// Optional header `Subsystem`.
    pub enum Subsystem: u16 {
        Unknown = 0,
        Native = 1,
        WindowsGui = 2,
        WindowsCui = 3,
        Os2Cui = 5,
        PosixCui = 7,
        NativeWindows = 8,
        WindowsCeGui = 9,
        EfiApplication = 10,
        EfiBootServiceDriver = 11,
        EfiRuntimeDriver = 12,
        EfiRom = 13,
        Xbox = 14,
        WindowsBootApplication = 16,
    }
}
