pub mod get_configuration;
pub mod get_event_status_notification;
pub mod get_performance;
pub mod inquiry;
pub mod mode_select;
pub mod mode_sense;
pub mod read;
pub mod read_capacity;
pub mod read_disc_structure;
pub mod read_toc;
pub mod request_sense;
pub mod test_unit_ready;

use crate::{scsi::ResultData, DataDirection};

pub trait Command {
    type Output;

    fn direction(&self) -> DataDirection;
    fn command(&self) -> Vec<u8>;

    /// The initial data buffer: parameter data for commands sending to the
    /// device, a zeroed allocation otherwise.
    fn data(&self) -> Vec<u8> {
        vec![0; self.data_size() as usize]
    }

    fn data_size(&self) -> u32 {
        0
    }

    fn process_result(&self, result: ResultData<'_>) -> crate::Result<Self::Output>;
}

macro_rules! bitfield_bound_check {
    ( $num:expr, $bit_count:expr, $name:literal ) => {
        if std::mem::size_of_val(&$num) as u32 * 8 - $num.leading_zeros() > $bit_count {
            Err(crate::Error::ArgumentOutOfBounds(format!(
                concat!(
                    $name,
                    " is out of bounds. The maximum possible value is {}, but {} was provided."
                ),
                1u128.wrapping_shl($bit_count) - 1,
                $num
            )))
        } else {
            Ok(())
        }
    };
}

pub(crate) use bitfield_bound_check;
