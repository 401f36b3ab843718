use super::cpu::INSTR_SIZE;

/// Physical, word-addressed RAM. Process isolation is the CPU's job; the RAM
/// itself only rejects addresses past its end.
#[derive(Debug)]
pub(crate) struct Ram {
    data: Vec<i32>,
}

impl Ram {
    pub fn new(size: usize) -> Ram {
        Ram { data: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn read(&self, address: usize) -> i32 {
        if address >= self.data.len() {
            panic!("Out of bounds memory access. Address {} is past the end of RAM", address);
        }

        self.data[address]
    }

    pub fn write(&mut self, address: usize, value: i32) {
        if address >= self.data.len() {
            panic!("Out of bounds memory access. Address {} is past the end of RAM", address);
        }

        self.data[address] = value;
    }

    /// Reads the instruction starting at `address`. Words past the end of RAM
    /// read as zero.
    pub fn fetch(&self, address: usize) -> [i32; INSTR_SIZE] {
        let mut instr = [0; INSTR_SIZE];
        for (offset, word) in instr.iter_mut().enumerate() {
            if let Some(value) = self.data.get(address + offset) {
                *word = *value;
            }
        }
        instr
    }

    #[cfg(test)]
    pub fn read_block_from(&self, start_address: usize, end_address: usize) -> Vec<i32> {
        if start_address > self.data.len() || end_address > self.data.len() {
            panic!("Out of bounds memory access. Start or end address is past the end of RAM");
        } else if start_address > end_address {
            panic!("Invalid memory range. Start address is greater than end address");
        }

        self.data[start_address..end_address].to_vec()
    }

    pub fn write_block_to(&mut self, address: usize, data: &[i32]) {
        let end_address = address + data.len();

        if end_address > self.data.len() {
            panic!("Out of bounds memory access");
        }

        self.data[address..end_address].copy_from_slice(data);
    }

    /// Moves `len` words from `src` to `dest`. The ranges may overlap.
    pub fn relocate(&mut self, src: usize, dest: usize, len: usize) {
        if src + len > self.data.len() || dest + len > self.data.len() {
            panic!("Out of bounds memory access while relocating {} words", len);
        }

        self.data.copy_within(src..src + len, dest);
    }
}
