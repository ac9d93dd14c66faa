//! The color control panel.
//!
//! [`ControlPanel`] is the single owner and the only writer of [`Controls`].
//! Everyone else reads a borrowed snapshot and uses [`ControlPanel::revision`]
//! to notice changes. Input arrives either from the keyboard (native) or from
//! `<input type="color">` elements in the host page (wasm).

use crate::data_structures::color::Color;

/// The three user-adjustable colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub shadow: Color,
    pub frame: Color,
    pub diamonds: Color,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            shadow: Color::rgb(0x00, 0x00, 0x00),
            frame: Color::rgb(0xff, 0xf0, 0xf0),
            diamonds: Color::rgb(0xff, 0xff, 0xff),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlKey {
    Shadow,
    Frame,
    Diamonds,
}

impl ControlKey {
    pub const ALL: [ControlKey; 3] = [ControlKey::Shadow, ControlKey::Frame, ControlKey::Diamonds];

    /// Name of the control, also the id of its element in the host page.
    pub fn id(self) -> &'static str {
        match self {
            ControlKey::Shadow => "shadow",
            ControlKey::Frame => "frame",
            ControlKey::Diamonds => "diamonds",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.id() == id)
    }

    fn presets(self) -> &'static [Color] {
        match self {
            ControlKey::Shadow => &SHADOW_PRESETS,
            ControlKey::Frame => &FRAME_PRESETS,
            ControlKey::Diamonds => &DIAMOND_PRESETS,
        }
    }

    fn index(self) -> usize {
        match self {
            ControlKey::Shadow => 0,
            ControlKey::Frame => 1,
            ControlKey::Diamonds => 2,
        }
    }
}

// First entry of every palette is the default of that channel.
const SHADOW_PRESETS: [Color; 4] = [
    Color::rgb(0x00, 0x00, 0x00),
    Color::rgb(0x3b, 0x2f, 0x2f),
    Color::rgb(0x1e, 0x2a, 0x4a),
    Color::rgb(0x80, 0x80, 0x80),
];
const FRAME_PRESETS: [Color; 5] = [
    Color::rgb(0xff, 0xf0, 0xf0),
    Color::rgb(0xff, 0xd7, 0x00),
    Color::rgb(0xe8, 0xb4, 0xa0),
    Color::rgb(0xc0, 0xc0, 0xc0),
    Color::rgb(0x11, 0x22, 0x33),
];
const DIAMOND_PRESETS: [Color; 5] = [
    Color::rgb(0xff, 0xff, 0xff),
    Color::rgb(0xaa, 0xbb, 0xcc),
    Color::rgb(0xe0, 0x11, 0x5f),
    Color::rgb(0x0f, 0x52, 0xba),
    Color::rgb(0x50, 0xc8, 0x78),
];

#[derive(Debug, Default)]
pub struct ControlPanel {
    controls: Controls,
    revision: u64,
    cursors: [usize; 3],
}

impl ControlPanel {
    pub fn new(controls: Controls) -> Self {
        Self {
            controls,
            revision: 0,
            cursors: [0; 3],
        }
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    /// Bumped on every change of any color.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, key: ControlKey) -> Color {
        match key {
            ControlKey::Shadow => self.controls.shadow,
            ControlKey::Frame => self.controls.frame,
            ControlKey::Diamonds => self.controls.diamonds,
        }
    }

    /// Set a channel from a CSS hex string. On error the old value stays.
    pub fn set(&mut self, key: ControlKey, value: &str) -> anyhow::Result<()> {
        let color = Color::parse(value)?;
        self.assign(key, color);
        Ok(())
    }

    /// Step a channel to the next color of its palette and return it.
    pub fn cycle(&mut self, key: ControlKey) -> Color {
        let presets = key.presets();
        let cursor = &mut self.cursors[key.index()];
        *cursor = (*cursor + 1) % presets.len();
        let color = presets[*cursor];
        self.assign(key, color);
        color
    }

    fn assign(&mut self, key: ControlKey, color: Color) {
        let slot = match key {
            ControlKey::Shadow => &mut self.controls.shadow,
            ControlKey::Frame => &mut self.controls.frame,
            ControlKey::Diamonds => &mut self.controls.diamonds,
        };
        if *slot != color {
            *slot = color;
            self.revision += 1;
            log::debug!("{} set to {}", key.id(), color);
        }
    }
}

/// Wire the page's color inputs to the event loop.
///
/// Every element that is missing is skipped with a warning, so a page
/// without controls still shows the ring in its default colors.
#[cfg(target_arch = "wasm32")]
pub fn bind_dom(
    proxy: &winit::event_loop::EventLoopProxy<crate::flow::ViewerEvent>,
    controls: &Controls,
) -> anyhow::Result<()> {
    use wasm_bindgen::{JsCast, closure::Closure};

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| anyhow::anyhow!("no document to bind controls to"))?;

    for key in ControlKey::ALL {
        let Some(element) = document.get_element_by_id(key.id()) else {
            log::warn!("no #{} input in the page", key.id());
            continue;
        };
        let Ok(input) = element.dyn_into::<web_sys::HtmlInputElement>() else {
            log::warn!("#{} is not an input element", key.id());
            continue;
        };
        let current = match key {
            ControlKey::Shadow => controls.shadow,
            ControlKey::Frame => controls.frame,
            ControlKey::Diamonds => controls.diamonds,
        };
        input.set_value(&current.to_hex());

        let proxy = proxy.clone();
        let source = input.clone();
        let on_input = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
            let _ = proxy.send_event(crate::flow::ViewerEvent::Control(key, source.value()));
        });
        input
            .add_event_listener_with_callback("input", on_input.as_ref().unchecked_ref())
            .map_err(|e| anyhow::anyhow!("could not listen on #{}: {e:?}", key.id()))?;
        // the page owns the listener for the rest of the session
        on_input.forget();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_panel() {
        let panel = ControlPanel::default();
        let c = panel.controls();
        assert_eq!(c.shadow.to_hex(), "#000000");
        assert_eq!(c.frame.to_hex(), "#fff0f0");
        assert_eq!(c.diamonds.to_hex(), "#ffffff");
        assert_eq!(panel.revision(), 0);
    }

    #[test]
    fn invalid_input_keeps_previous_value() {
        let mut panel = ControlPanel::default();
        assert!(panel.set(ControlKey::Frame, "not a color").is_err());
        assert_eq!(panel.get(ControlKey::Frame).to_hex(), "#fff0f0");
        assert_eq!(panel.revision(), 0);
    }

    #[test]
    fn revision_counts_real_changes_only() {
        let mut panel = ControlPanel::default();
        panel.set(ControlKey::Frame, "#112233").unwrap();
        assert_eq!(panel.revision(), 1);
        panel.set(ControlKey::Frame, "#112233").unwrap();
        assert_eq!(panel.revision(), 1);
        panel.set(ControlKey::Diamonds, "#abc").unwrap();
        assert_eq!(panel.revision(), 2);
        assert_eq!(panel.controls().diamonds.to_hex(), "#aabbcc");
    }

    #[test]
    fn cycling_wraps_back_to_the_default() {
        let mut panel = ControlPanel::default();
        let first = panel.cycle(ControlKey::Shadow);
        assert_ne!(first, Color::BLACK);
        for _ in 0..SHADOW_PRESETS.len() - 1 {
            panel.cycle(ControlKey::Shadow);
        }
        assert_eq!(panel.get(ControlKey::Shadow), Color::BLACK);
    }

    #[test]
    fn ids_round_trip() {
        for key in ControlKey::ALL {
            assert_eq!(ControlKey::from_id(key.id()), Some(key));
        }
        assert_eq!(ControlKey::from_id("background"), None);
    }
}
