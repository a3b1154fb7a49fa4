//! Process-wide identifier generation.
//!
//! A small decl macro for newtype ids backed by an `AtomicU32` counter,
//! so adding another kind of id is a one-line declaration rather than
//! a hand-rolled `Display`/`gen` pair each time.

/// Declares a newtype identifier backed by a process-wide atomic counter.
#[macro_export]
macro_rules! create_global_uid {
    ($(
        $(#[$outer:meta])*
        $vis:vis $ident:ident = $counter:ident;
    )+) => {
        $(
            $(#[$outer])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            #[repr(transparent)]
            $vis struct $ident(u32);

            static $counter: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

            impl $ident {
                /// Generates a new, process-wide unique identifier.
                pub fn gen() -> Self {
                    Self($counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
                }
            }

            impl std::fmt::Display for $ident {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    std::fmt::Display::fmt(&self.0, f)
                }
            }
        )+
    };
}
