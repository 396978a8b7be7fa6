/*!
 * Pause Command
 * Resolves the infra process command line
 */

use crate::config::RuntimeConfig;
use crate::core::errors::{ProvisionError, ProvisionResult};
use crate::storage::ImageConfig;

/// Command the infra process runs
///
/// A configured `pause_command` is used verbatim. When it is empty the
/// command comes from the pause image's entrypoint followed by its cmd.
pub fn pause_command(
    config: Option<&RuntimeConfig>,
    image: Option<&ImageConfig>,
) -> ProvisionResult<Vec<String>> {
    let config =
        config.ok_or_else(|| ProvisionError::validation("provided configuration is nil"))?;

    if !config.pause_command.is_empty() {
        return Ok(vec![config.pause_command.clone()]);
    }

    let command: Vec<String> = image
        .map(|image| image.entrypoint.iter().chain(&image.cmd).cloned().collect())
        .unwrap_or_default();

    if command.is_empty() {
        return Err(ProvisionError::validation(format!(
            "unable to run pause image {:?}: neither Cmd nor Entrypoint specified",
            config.pause_image
        )));
    }
    Ok(command)
}
