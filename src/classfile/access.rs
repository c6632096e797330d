use bitflags::bitflags;

bitflags! {
    /// Access and property flags of classes, fields and methods.
    ///
    /// The class file format reuses bit positions between the three kinds of structures, so
    /// several names share a value (`SUPER`/`SYNCHRONIZED`, `VOLATILE`/`BRIDGE`,
    /// `TRANSIENT`/`VARARGS`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        /// Declared `public`
        const PUBLIC = 0x0001;
        /// Declared `private`
        const PRIVATE = 0x0002;
        /// Declared `protected`
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final`
        const FINAL = 0x0010;
        /// Class: treat superclass methods specially in `invokespecial`
        const SUPER = 0x0020;
        /// Method: declared `synchronized`
        const SYNCHRONIZED = 0x0020;
        /// Field: declared `volatile`
        const VOLATILE = 0x0040;
        /// Method: compiler generated bridge
        const BRIDGE = 0x0040;
        /// Field: declared `transient`
        const TRANSIENT = 0x0080;
        /// Method: variable arity
        const VARARGS = 0x0080;
        /// Method: declared `native`
        const NATIVE = 0x0100;
        /// Class: is an interface
        const INTERFACE = 0x0200;
        /// Declared `abstract`
        const ABSTRACT = 0x0400;
        /// Method: declared `strictfp`
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Class: annotation interface
        const ANNOTATION = 0x2000;
        /// Class: enum class. Field: enumerator
        const ENUM = 0x4000;
        /// Class: module descriptor
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// True when `STATIC` is set.
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    /// True when `FINAL` is set.
    #[must_use]
    pub fn is_final(self) -> bool {
        self.contains(AccessFlags::FINAL)
    }
}
