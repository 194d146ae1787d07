//! Button input forwarding.
//!
//! The embedding layer translates its own key and gamepad events into [`Button`]s and forwards
//! them with [`ModuleHandle::set_button`].

use tracing::{debug, trace};

use crate::abi::{Button, Export};
use crate::error::Result;
use crate::module::ModuleHandle;

impl ModuleHandle {
    /// Forward a button transition to the core.
    ///
    /// Returns `false` if the core has no `set_button` export or does not have this button.
    pub fn set_button(&mut self, button: Button, pressed: bool) -> Result<bool> {
        if !button.supported_by(self.core) {
            debug!(core = %self.core, ?button, "button not present on this core, ignoring");
            return Ok(false);
        }
        let Some(set_button) = self.exports.set_button.clone() else {
            return Ok(false);
        };
        trace!(?button, pressed, "button");
        let args = (i32::from(button.id()), i32::from(pressed));
        self.guarded(Export::SetButton, |store| set_button.call(store, args))?;
        Ok(true)
    }

    /// Forward a raw button id. Unknown ids are ignored.
    pub fn set_button_id(&mut self, id: u8, pressed: bool) -> Result<bool> {
        match Button::from_id(id) {
            Some(button) => self.set_button(button, pressed),
            None => {
                debug!(id, "unknown button id, ignoring");
                Ok(false)
            }
        }
    }
}
