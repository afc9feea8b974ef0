//! Core Mesh and Field Vocabulary
//!
//! Coordinate axes, mesh faces, Yee field components and the physical
//! constants shared by every subsystem. Everything indexing the 3D grid
//! speaks in terms of these enums.

/// Field storage precision. 32-bit by default; auxiliary currents and
/// filter states stay 64-bit complex regardless of this choice.
#[cfg(not(feature = "f64-fields"))]
pub type Real = f32;
#[cfg(feature = "f64-fields")]
pub type Real = f64;

/// Speed of light in vacuum [m/s].
pub const C0: Real = 2.99792458e8 as Real;

/// Permittivity of free space [F/m].
pub const EPS0: Real = 8.8541878128e-12 as Real;

/// Permeability of free space [H/m].
pub const MU0: Real = 1.25663706212e-6 as Real;

/// Impedance of free space [ohm].
pub const ETA0: Real = 376.730313668 as Real;

/// Coordinate axes of the structured grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Next axis in cyclic x -> y -> z -> x order.
    #[inline]
    pub fn next(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::Z,
            Axis::Z => Axis::X,
        }
    }

    /// Previous axis in cyclic order.
    #[inline]
    pub fn prev(self) -> Axis {
        self.next().next()
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Faces of a cuboid region. The low/high pairing per axis is significant:
/// `face.axis()` and `face.is_low()` drive all boundary dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    XLo = 0,
    XHi = 1,
    YLo = 2,
    YHi = 3,
    ZLo = 4,
    ZHi = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::XLo,
        Face::XHi,
        Face::YLo,
        Face::YHi,
        Face::ZLo,
        Face::ZHi,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn axis(self) -> Axis {
        match self {
            Face::XLo | Face::XHi => Axis::X,
            Face::YLo | Face::YHi => Axis::Y,
            Face::ZLo | Face::ZHi => Axis::Z,
        }
    }

    #[inline]
    pub fn is_low(self) -> bool {
        matches!(self, Face::XLo | Face::YLo | Face::ZLo)
    }

    #[inline]
    pub fn opposite(self) -> Face {
        match self {
            Face::XLo => Face::XHi,
            Face::XHi => Face::XLo,
            Face::YLo => Face::YHi,
            Face::YHi => Face::YLo,
            Face::ZLo => Face::ZHi,
            Face::ZHi => Face::ZLo,
        }
    }

    #[inline]
    pub fn low(axis: Axis) -> Face {
        match axis {
            Axis::X => Face::XLo,
            Axis::Y => Face::YLo,
            Axis::Z => Face::ZLo,
        }
    }

    #[inline]
    pub fn high(axis: Axis) -> Face {
        match axis {
            Axis::X => Face::XHi,
            Axis::Y => Face::YHi,
            Axis::Z => Face::ZHi,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Face::XLo => "xlo",
            Face::XHi => "xhi",
            Face::YLo => "ylo",
            Face::YHi => "yhi",
            Face::ZLo => "zlo",
            Face::ZHi => "zhi",
        }
    }
}

/// The six Yee field components. E components live on cell edges, H
/// components on face centres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldComponent {
    Ex = 0,
    Ey = 1,
    Ez = 2,
    Hx = 3,
    Hy = 4,
    Hz = 5,
}

impl FieldComponent {
    pub const ALL: [FieldComponent; 6] = [
        FieldComponent::Ex,
        FieldComponent::Ey,
        FieldComponent::Ez,
        FieldComponent::Hx,
        FieldComponent::Hy,
        FieldComponent::Hz,
    ];

    pub const ELECTRIC: [FieldComponent; 3] =
        [FieldComponent::Ex, FieldComponent::Ey, FieldComponent::Ez];

    pub const MAGNETIC: [FieldComponent; 3] =
        [FieldComponent::Hx, FieldComponent::Hy, FieldComponent::Hz];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_electric(self) -> bool {
        (self as usize) < 3
    }

    #[inline]
    pub fn axis(self) -> Axis {
        match self {
            FieldComponent::Ex | FieldComponent::Hx => Axis::X,
            FieldComponent::Ey | FieldComponent::Hy => Axis::Y,
            FieldComponent::Ez | FieldComponent::Hz => Axis::Z,
        }
    }

    #[inline]
    pub fn electric(axis: Axis) -> FieldComponent {
        match axis {
            Axis::X => FieldComponent::Ex,
            Axis::Y => FieldComponent::Ey,
            Axis::Z => FieldComponent::Ez,
        }
    }

    #[inline]
    pub fn magnetic(axis: Axis) -> FieldComponent {
        match axis {
            Axis::X => FieldComponent::Hx,
            Axis::Y => FieldComponent::Hy,
            Axis::Z => FieldComponent::Hz,
        }
    }

    /// True if the component is sampled on an integer grid line along the
    /// face axis, i.e. it lies *in* the boundary plane of that face.
    /// Tangential E and normal H are in-plane; normal E and tangential H
    /// sit half a cell off the plane.
    #[inline]
    pub fn lies_in_boundary(self, face: Face) -> bool {
        if self.is_electric() {
            self.axis() != face.axis()
        } else {
            self.axis() == face.axis()
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldComponent::Ex => "Ex",
            FieldComponent::Ey => "Ey",
            FieldComponent::Ez => "Ez",
            FieldComponent::Hx => "Hx",
            FieldComponent::Hy => "Hy",
            FieldComponent::Hz => "Hz",
        }
    }
}
