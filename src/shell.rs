// Interactive text shell
//
// Menu-driven terminal front end for the parking workflow. Reads selections and
// registration numbers line by line and prints the outcome of each operation.
// Generic over reader/writer so it can be driven from tests.

use anyhow::Result;
use std::io::{BufRead, Write};
use tracing::{debug, error};

use crate::entities::VehicleCategory;
use crate::error::ParkingError;
use crate::fare::FREE_TIME_HOURS;
use crate::service::ParkingService;
use crate::store::{SpotDirectory, TicketStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Entry,
    Exit,
    Shutdown,
}

impl MenuChoice {
    pub fn from_selection(selection: u32) -> Option<Self> {
        match selection {
            1 => Some(MenuChoice::Entry),
            2 => Some(MenuChoice::Exit),
            3 => Some(MenuChoice::Shutdown),
            _ => None,
        }
    }
}

pub struct InteractiveShell<'a, D, T, R, W> {
    service: &'a ParkingService<D, T>,
    input: R,
    output: W,
}

impl<'a, D, T, R, W> InteractiveShell<'a, D, T, R, W>
where
    D: SpotDirectory,
    T: TicketStore,
    R: BufRead,
    W: Write,
{
    pub fn new(service: &'a ParkingService<D, T>, input: R, output: W) -> Self {
        InteractiveShell {
            service,
            input,
            output,
        }
    }

    /// Main loop; returns on "Shutdown" or end of input
    pub fn run(&mut self) -> Result<()> {
        writeln!(self.output, "Welcome to Parking System!")?;

        loop {
            self.print_menu()?;

            let Some(line) = self.read_line()? else {
                break;
            };

            match parse_selection(&line).and_then(MenuChoice::from_selection) {
                Some(MenuChoice::Entry) => self.handle_entry()?,
                Some(MenuChoice::Exit) => self.handle_exit()?,
                Some(MenuChoice::Shutdown) => break,
                None => {
                    writeln!(self.output, "Unsupported option. Please enter a number corresponding to the provided menu")?;
                }
            }
        }

        writeln!(self.output, "Exiting from the system!")?;
        Ok(())
    }

    fn print_menu(&mut self) -> Result<()> {
        writeln!(self.output, "Please select an option. Simply enter the number to choose an action")?;
        writeln!(self.output, "1 New Vehicle Entering - Allocate Parking Space")?;
        writeln!(self.output, "2 Vehicle Exiting - Generate Ticket Price")?;
        writeln!(self.output, "3 Shutdown System")?;
        Ok(())
    }

    fn handle_entry(&mut self) -> Result<()> {
        writeln!(self.output, "Please select vehicle type from menu")?;
        writeln!(self.output, "1 CAR")?;
        writeln!(self.output, "2 BIKE")?;

        let selection = self.read_line()?;
        let Some(category) = selection
            .as_deref()
            .and_then(parse_selection)
            .and_then(VehicleCategory::from_selection)
        else {
            error!(input = ?selection, "incorrect vehicle type provided");
            writeln!(self.output, "That's not a correct input")?;
            return Ok(());
        };

        let Some(vehicle_id) = self.read_vehicle_id()? else {
            return Ok(());
        };

        match self.service.process_entry(category, &vehicle_id) {
            Ok(ticket) => {
                writeln!(self.output, "Generated Ticket and saved in DB")?;
                if ticket.discount {
                    writeln!(
                        self.output,
                        "Welcome back! As a recurring user of our parking lot, you'll benefit from a 5% discount."
                    )?;
                }
                writeln!(self.output, "Please park your vehicle in spot number: {}", ticket.spot.number)?;
                writeln!(
                    self.output,
                    "Recorded in-time for vehicle number: {} is: {}",
                    ticket.vehicle_id,
                    ticket.entry_time.format("%Y-%m-%d %H:%M:%S")
                )?;
            }
            Err(e) => writeln!(self.output, "{}", describe_error(&e))?,
        }

        Ok(())
    }

    fn handle_exit(&mut self) -> Result<()> {
        let Some(vehicle_id) = self.read_vehicle_id()? else {
            return Ok(());
        };

        match self.service.process_exit(&vehicle_id) {
            Ok(receipt) => {
                if receipt.was_free {
                    writeln!(
                        self.output,
                        "You've been parked less than {}mn. Nothing to pay !",
                        (FREE_TIME_HOURS * 60.0) as u32
                    )?;
                } else {
                    writeln!(self.output, "Please pay the parking fare: {:.2}", receipt.price)?;
                }
                if let Some(exit_time) = receipt.ticket.exit_time {
                    writeln!(
                        self.output,
                        "Recorded out-time for vehicle number: {} is: {}",
                        receipt.ticket.vehicle_id,
                        exit_time.format("%Y-%m-%d %H:%M:%S")
                    )?;
                }
            }
            Err(e) => writeln!(self.output, "{}", describe_error(&e))?,
        }

        Ok(())
    }

    fn read_vehicle_id(&mut self) -> Result<Option<String>> {
        writeln!(self.output, "Please type the vehicle registration number and press enter key")?;

        match self.read_line()? {
            Some(line) if !line.trim().is_empty() => Ok(Some(line.trim().to_string())),
            _ => {
                error!("empty vehicle registration number");
                writeln!(
                    self.output,
                    "Error reading input. Please enter a valid string for vehicle registration number"
                )?;
                Ok(None)
            }
        }
    }

    /// One line without its terminator, None at end of input
    fn read_line(&mut self) -> Result<Option<String>> {
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            debug!("end of input");
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

fn parse_selection(line: &str) -> Option<u32> {
    line.trim().parse().ok()
}

/// User-facing message for a failed operation
pub fn describe_error(err: &ParkingError) -> String {
    match err {
        ParkingError::InvalidInput(_) => {
            "Error reading input. Please enter a valid string for vehicle registration number".to_string()
        }
        ParkingError::LotFull(_) => "You cannot enter. Parking slots are full".to_string(),
        ParkingError::TicketNotFound(_) => {
            "Unable to get your ticket. Please check your registration number".to_string()
        }
        ParkingError::TicketUpdateFailed(_) => {
            "Unable to update ticket information. Error occurred".to_string()
        }
        ParkingError::FareComputationFailed(_) | ParkingError::UnknownCategory(_) => {
            "Unable to compute the parking fare. Please contact an attendant".to_string()
        }
        ParkingError::PersistenceFailure(_) | ParkingError::EntryFailed(_) => {
            "Unable to process incoming vehicle. Please try again".to_string()
        }
        ParkingError::ExitFailed(_) => "Unable to process exiting vehicle. Please try again".to_string(),
    }
}
