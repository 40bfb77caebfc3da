// THEORY:
// `Pixel` is the smallest unit of the system: a "dumb" container for three 8-bit
// channels. It carries no alpha and no derived values. Anything that needs a
// neighbor (averaging, windows) belongs in `blur`, and anything that needs the
// grid shape belongs in `PixelBuffer`.

pub type Byte = u8;
pub type Bytes = Vec<Byte>;
pub type Channel = Byte;

pub const CHANNELS: usize = 3;

/// A single RGB pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
}

impl Pixel {
    pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        Pixel { red, green, blue }
    }

    /// Channels in wire order.
    pub const fn channels(&self) -> [Channel; CHANNELS] {
        [self.red, self.green, self.blue]
    }

    /// Builds a pixel from a per-channel closure, in wire order.
    pub fn map_channels(&self, mut f: impl FnMut(usize, Channel) -> Channel) -> Self {
        Pixel {
            red: f(0, self.red),
            green: f(1, self.green),
            blue: f(2, self.blue),
        }
    }
}

impl From<[Byte; CHANNELS]> for Pixel {
    fn from([red, green, blue]: [Byte; CHANNELS]) -> Self {
        Pixel::new(red, green, blue)
    }
}

impl From<Pixel> for [Byte; CHANNELS] {
    fn from(pixel: Pixel) -> Self {
        pixel.channels()
    }
}

impl From<Pixel> for Bytes {
    fn from(pixel: Pixel) -> Self {
        pixel.channels().to_vec()
    }
}
